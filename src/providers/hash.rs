//! One-way providers: md5, hash and the md5-derived Italian identifiers
//!
//! All of them are deterministic: equal inputs map to equal outputs in every
//! table and every run, which keeps foreign keys that share a value consistent.

use super::{input_text, Params, Provider, ProviderError, RowContext};
use crate::domain::result::Result;
use md5::Md5;
use serde_json::Value;
use sha2::{Digest, Sha256};

const MONTH_LETTERS: [char; 12] = ['A', 'B', 'C', 'D', 'E', 'H', 'L', 'M', 'P', 'R', 'S', 'T'];

fn md5_bytes(input: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md5::digest(input.as_bytes()));
    out
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// MD5 hex digest, or its value modulo `10^as_number_length`
#[derive(Debug)]
pub struct Md5Provider {
    as_number: bool,
    modulus: u128,
}

impl Md5Provider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["as_number", "as_number_length"])?;
        let length = params.u64("as_number_length")?.unwrap_or(8);
        if !(1..=18).contains(&length) {
            return Err(params.invalid("'as_number_length' must be between 1 and 18"));
        }
        Ok(Self {
            as_number: params.bool("as_number")?.unwrap_or(false),
            modulus: 10u128.pow(length as u32),
        })
    }
}

impl Provider for Md5Provider {
    fn strategy(&self) -> &str {
        "md5"
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let digest = md5_bytes(&input_text(original)?);
        if self.as_number {
            let number = u128::from_be_bytes(digest) % self.modulus;
            Ok(Value::from(number as u64))
        } else {
            Ok(Value::String(to_hex(&digest)))
        }
    }
}

/// Salted SHA-256 hex digest, optionally truncated
#[derive(Debug)]
pub struct HashProvider {
    salt: String,
    length: usize,
}

impl HashProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["salt", "length"])?;
        let length = params.u64("length")?.unwrap_or(64) as usize;
        if !(1..=64).contains(&length) {
            return Err(params.invalid("'length' must be between 1 and 64"));
        }
        Ok(Self {
            salt: params.str("salt")?.unwrap_or_default().to_string(),
            length,
        })
    }
}

impl Provider for HashProvider {
    fn strategy(&self) -> &str {
        "hash"
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let text = input_text(original)?;
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(text.as_bytes());
        let mut hex = to_hex(&hasher.finalize());
        hex.truncate(self.length);
        Ok(Value::String(hex))
    }
}

/// Which Italian identifier an [`ItalianIdProvider`] produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItalianId {
    /// Personal fiscal code (16 characters)
    FiscalCode,
    /// `IT` + 9 digits; the first two input characters are ignored
    VatNumber,
    /// 9 digits
    FiscalCodeBusiness,
    /// Business code for inputs starting with a digit, personal code otherwise
    FiscalCodeVat,
}

impl ItalianId {
    fn strategy(self) -> &'static str {
        match self {
            ItalianId::FiscalCode => "fiscalcode",
            ItalianId::VatNumber => "vatnumber",
            ItalianId::FiscalCodeBusiness => "fiscalcodebusiness",
            ItalianId::FiscalCodeVat => "fiscalcodevat",
        }
    }
}

/// Replaces an Italian fiscal identifier with a well-formed pseudonym
#[derive(Debug)]
pub struct ItalianIdProvider {
    kind: ItalianId,
}

impl ItalianIdProvider {
    pub fn from_params(kind: ItalianId, params: Params<'_>) -> Result<Self> {
        params.allow_only(&[])?;
        Ok(Self { kind })
    }
}

impl Provider for ItalianIdProvider {
    fn strategy(&self) -> &str {
        self.kind.strategy()
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let text = input_text(original)?;
        let out = match self.kind {
            ItalianId::FiscalCode => personal_code(&text),
            ItalianId::VatNumber => {
                let digits: String = text.chars().skip(2).collect();
                format!("IT{}", business_code(&digits))
            }
            ItalianId::FiscalCodeBusiness => business_code(&text),
            ItalianId::FiscalCodeVat => {
                if text.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                    business_code(&text)
                } else {
                    personal_code(&text)
                }
            }
        };
        Ok(Value::String(out))
    }
}

fn business_code(input: &str) -> String {
    md5_bytes(input)
        .iter()
        .take(9)
        .map(|b| char::from(b'0' + b % 10))
        .collect()
}

/// Six letters, two digits, month letter, two day digits, letter, three digits, letter
fn personal_code(input: &str) -> String {
    let digest = md5_bytes(input);
    let letters: Vec<char> = digest.iter().map(|b| char::from(b'A' + b % 26)).collect();
    let mut digits: Vec<char> = digest[6..]
        .iter()
        .map(|b| char::from(b'0' + b % 10))
        .collect();

    let month = if MONTH_LETTERS.contains(&letters[8]) {
        letters[8]
    } else {
        MONTH_LETTERS[4]
    };
    if digits[3] > '7' {
        digits[3] = '1';
    }

    let mut out = String::with_capacity(16);
    out.extend(&letters[..6]);
    out.extend(&digits[..2]);
    out.push(month);
    out.extend(&digits[3..5]);
    out.push(letters[11]);
    out.extend(&digits[6..9]);
    out.push(letters[12]);
    out
}
