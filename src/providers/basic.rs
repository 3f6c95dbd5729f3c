//! Static and structural providers: choice, clear, set, jsonstring, sequence

use super::{input_text, seeded_rng, Params, Provider, ProviderError, RowContext};
use crate::domain::result::Result;
use rand::seq::SliceRandom;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// Picks one element of `values`
#[derive(Debug)]
pub struct ChoiceProvider {
    values: Vec<Value>,
    seed: Option<u64>,
}

impl ChoiceProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["values", "seed"])?;
        let values = match params.value("values") {
            Some(Value::Array(values)) if !values.is_empty() => values.clone(),
            _ => return Err(params.invalid("'values' must be a non-empty list")),
        };
        Ok(Self {
            values,
            seed: params.seed()?,
        })
    }
}

impl Provider for ChoiceProvider {
    fn strategy(&self) -> &str {
        "choice"
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let text = input_text(original)?;
        let mut rng = seeded_rng(self.seed, "choice", &text);
        self.values
            .choose(&mut rng)
            .cloned()
            .ok_or_else(|| ProviderError::new("no values to choose from"))
    }

    fn is_deterministic(&self) -> bool {
        self.seed.is_some()
    }
}

/// Sets the column to NULL (`clear`, `set_null`)
#[derive(Debug)]
pub struct ClearProvider {
    strategy: String,
}

impl ClearProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&[])?;
        Ok(Self {
            strategy: params.strategy().to_string(),
        })
    }
}

impl Provider for ClearProvider {
    fn strategy(&self) -> &str {
        &self.strategy
    }

    fn alter_value(
        &self,
        _original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        Ok(Value::Null)
    }

    fn handles_null(&self) -> bool {
        true
    }
}

/// Sets a static value
#[derive(Debug)]
pub struct SetProvider {
    value: Value,
}

impl SetProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["value"])?;
        Ok(Self {
            value: params.value("value").cloned().unwrap_or(Value::Null),
        })
    }
}

impl Provider for SetProvider {
    fn strategy(&self) -> &str {
        "set"
    }

    fn alter_value(
        &self,
        _original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        Ok(self.value.clone())
    }

    fn handles_null(&self) -> bool {
        true
    }
}

/// Writes `object` serialized as a JSON string
#[derive(Debug)]
pub struct JsonStringProvider {
    rendered: String,
}

impl JsonStringProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["object"])?;
        let object = params
            .value("object")
            .ok_or_else(|| params.invalid("'object' is required"))?;
        let rendered = serde_json::to_string(object)
            .map_err(|e| params.invalid(format!("'object' is not serializable: {e}")))?;
        Ok(Self { rendered })
    }
}

impl Provider for JsonStringProvider {
    fn strategy(&self) -> &str {
        "jsonstring"
    }

    fn alter_value(
        &self,
        _original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        Ok(Value::String(self.rendered.clone()))
    }

    fn handles_null(&self) -> bool {
        true
    }
}

/// Per-instance counter: `start`, `start + step`, ...
///
/// Numbers are written as integers unless `prefix` is set. The counter is
/// shared by every table using the same instance; outputs on a rerun differ.
#[derive(Debug)]
pub struct SequenceProvider {
    next: AtomicI64,
    step: i64,
    prefix: Option<String>,
}

impl SequenceProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["start", "step", "prefix"])?;
        let step = params.i64("step")?.unwrap_or(1);
        if step == 0 {
            return Err(params.invalid("'step' cannot be 0"));
        }
        Ok(Self {
            next: AtomicI64::new(params.i64("start")?.unwrap_or(1)),
            step,
            prefix: params.str("prefix")?.map(str::to_string),
        })
    }
}

impl Provider for SequenceProvider {
    fn strategy(&self) -> &str {
        "sequence"
    }

    fn alter_value(
        &self,
        _original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let current = self.next.fetch_add(self.step, Ordering::Relaxed);
        Ok(match &self.prefix {
            Some(prefix) => Value::String(format!("{prefix}{current}")),
            None => Value::from(current),
        })
    }

    fn handles_null(&self) -> bool {
        true
    }

    fn is_deterministic(&self) -> bool {
        false
    }
}
