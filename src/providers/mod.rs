//! Anonymization providers
//!
//! A provider implements one strategy: it receives the original value of a
//! column (or JSON sub-field) plus read-only access to the original row, and
//! returns the replacement value. Providers are resolved once per run through
//! the [`ProviderRegistry`] and then shared by every rule that references them.
//!
//! Seeded providers derive their randomness from the seed and the original
//! value, so the same input always yields the same output across batches,
//! tables and runs.

pub mod basic;
pub mod fake;
pub mod hash;
pub mod mask;
pub mod random;
pub mod registry;

pub use registry::{ProviderRegistry, ProviderSet};

use crate::domain::errors::PgMaskError;
use crate::domain::result::Result;
use crate::domain::row::{value_as_text, ColumnInfo};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Failure of a provider on one value
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ProviderError(String);

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Read-only view of the original row handed to providers
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    columns: &'a [ColumnInfo],
    values: &'a [Value],
}

impl<'a> RowContext<'a> {
    pub fn new(columns: &'a [ColumnInfo], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    /// Original value of another column, if it was read
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .and_then(|i| self.values.get(i))
    }
}

/// A transformation implementing one anonymization strategy
pub trait Provider: Send + Sync + fmt::Debug {
    /// Strategy name this instance was resolved from
    fn strategy(&self) -> &str;

    /// Produce the replacement for `original`
    ///
    /// Never called with `Value::Null` unless [`Provider::handles_null`] is true.
    fn alter_value(
        &self,
        original: &Value,
        ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError>;

    /// Whether NULL inputs are handed to the provider instead of passed through
    fn handles_null(&self) -> bool {
        false
    }

    /// Whether equal inputs always produce equal outputs
    fn is_deterministic(&self) -> bool {
        true
    }
}

/// Typed access to a provider's parameter map
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    strategy: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    pub fn new(strategy: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { strategy, map }
    }

    pub fn strategy(&self) -> &'a str {
        self.strategy
    }

    /// Builds an [`PgMaskError::InvalidParameter`] for this strategy
    pub fn invalid(&self, message: impl Into<String>) -> PgMaskError {
        PgMaskError::InvalidParameter {
            strategy: self.strategy.to_string(),
            message: message.into(),
        }
    }

    /// Rejects keys the provider does not understand
    pub fn allow_only(&self, allowed: &[&str]) -> Result<()> {
        for key in self.map.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(self.invalid(format!(
                    "unknown parameter '{key}' (accepted: {})",
                    if allowed.is_empty() {
                        "none".to_string()
                    } else {
                        allowed.join(", ")
                    }
                )));
            }
        }
        Ok(())
    }

    pub fn value(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    pub fn str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.invalid(format!("'{key}' must be a string, got {other}"))),
        }
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
                self.invalid(format!("'{key}' must be a non-negative integer, got {n}"))
            }),
            Some(other) => Err(self.invalid(format!("'{key}' must be an integer, got {other}"))),
        }
    }

    pub fn i64(&self, key: &str) -> Result<Option<i64>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("'{key}' must be an integer, got {n}"))),
            Some(other) => Err(self.invalid(format!("'{key}' must be an integer, got {other}"))),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.invalid(format!("'{key}' must be a boolean, got {other}"))),
        }
    }

    /// The optional `seed` parameter shared by all randomized providers
    pub fn seed(&self) -> Result<Option<u64>> {
        self.u64("seed")
    }
}

/// Text of a non-null input value
pub(crate) fn input_text<'v>(
    value: &'v Value,
) -> std::result::Result<Cow<'v, str>, ProviderError> {
    value_as_text(value).ok_or_else(|| ProviderError::new("unexpected NULL input"))
}

/// RNG for one call
///
/// With a seed, the stream is derived from SHA-256 over the seed, a scope
/// string and the input text; without one it is freshly seeded.
pub(crate) fn seeded_rng(seed: Option<u64>, scope: &str, input: &str) -> StdRng {
    match seed {
        Some(seed) => {
            let mut hasher = Sha256::new();
            hasher.update(seed.to_le_bytes());
            hasher.update(scope.as_bytes());
            hasher.update([0u8]);
            hasher.update(input.as_bytes());
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&hasher.finalize());
            StdRng::from_seed(bytes)
        }
        None => StdRng::seed_from_u64(rand::random()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Runs a provider against a row that only holds `value`
    pub fn alter(provider: &dyn Provider, value: Value) -> std::result::Result<Value, ProviderError> {
        let columns = [ColumnInfo::new("value", "text")];
        let values = [value.clone()];
        provider.alter_value(&value, &RowContext::new(&columns, &values))
    }
}
