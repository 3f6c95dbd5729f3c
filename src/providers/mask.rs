//! Redaction providers: mask, partial_mask

use super::{input_text, Params, Provider, ProviderError, RowContext};
use crate::domain::result::Result;
use serde_json::Value;

const DEFAULT_SIGN: &str = "X";

fn sign_param(params: &Params<'_>) -> Result<String> {
    Ok(params
        .str("sign")?
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SIGN)
        .to_string())
}

/// Replaces every character with `sign`
#[derive(Debug)]
pub struct MaskProvider {
    sign: String,
}

impl MaskProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["sign"])?;
        Ok(Self {
            sign: sign_param(&params)?,
        })
    }
}

impl Provider for MaskProvider {
    fn strategy(&self) -> &str {
        "mask"
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let text = input_text(original)?;
        Ok(Value::String(self.sign.repeat(text.chars().count())))
    }
}

/// Masks the middle, keeping `unmasked_left`/`unmasked_right` characters
///
/// Values too short to keep both ends are masked entirely.
#[derive(Debug)]
pub struct PartialMaskProvider {
    sign: String,
    left: usize,
    right: usize,
}

impl PartialMaskProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["sign", "unmasked_left", "unmasked_right"])?;
        Ok(Self {
            sign: sign_param(&params)?,
            left: params.u64("unmasked_left")?.unwrap_or(1) as usize,
            right: params.u64("unmasked_right")?.unwrap_or(1) as usize,
        })
    }
}

impl Provider for PartialMaskProvider {
    fn strategy(&self) -> &str {
        "partial_mask"
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let text = input_text(original)?;
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        if len <= self.left + self.right {
            return Ok(Value::String(self.sign.repeat(len)));
        }

        let mut out: String = chars[..self.left].iter().collect();
        out.push_str(&self.sign.repeat(len - self.left - self.right));
        out.extend(&chars[len - self.right..]);
        Ok(Value::String(out))
    }
}
