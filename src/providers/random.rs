//! Randomized identifier providers: uuid4, apikey, phonenumberita, randomidcard, sameyear
//!
//! Each accepts an optional `seed`; with one, output depends only on the seed
//! and the original value.

use super::{input_text, seeded_rng, Params, Provider, ProviderError, RowContext};
use crate::domain::result::Result;
use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

/// Random identifier layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomKind {
    /// Version 4 UUID (`uuid4`, `apikey`)
    Uuid,
    /// `+003` followed by nine digits
    PhoneNumberIta,
    /// Two uppercase letters followed by seven digits
    IdCard,
}

/// Generates a random identifier shaped by [`RandomKind`]
#[derive(Debug)]
pub struct RandomIdProvider {
    strategy: String,
    kind: RandomKind,
    seed: Option<u64>,
}

impl RandomIdProvider {
    pub fn from_params(kind: RandomKind, params: Params<'_>) -> Result<Self> {
        params.allow_only(&["seed"])?;
        Ok(Self {
            strategy: params.strategy().to_string(),
            kind,
            seed: params.seed()?,
        })
    }
}

pub(crate) fn uuid_v4(rng: &mut StdRng) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

fn digits(rng: &mut StdRng, count: usize) -> String {
    (0..count)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

impl Provider for RandomIdProvider {
    fn strategy(&self) -> &str {
        &self.strategy
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let text = input_text(original)?;
        let mut rng = seeded_rng(self.seed, &self.strategy, &text);
        let out = match self.kind {
            RandomKind::Uuid => uuid_v4(&mut rng).to_string(),
            RandomKind::PhoneNumberIta => format!("+003{}", digits(&mut rng, 9)),
            RandomKind::IdCard => {
                let letters: String = (0..2)
                    .map(|_| char::from(b'A' + rng.gen_range(0..26u8)))
                    .collect();
                format!("{letters}{}", digits(&mut rng, 7))
            }
        };
        Ok(Value::String(out))
    }

    fn is_deterministic(&self) -> bool {
        self.seed.is_some()
    }
}

/// Random date within the year of the original date
///
/// Accepts `YYYY-MM-DD` and anything starting with it (timestamps).
#[derive(Debug)]
pub struct SameYearProvider {
    seed: Option<u64>,
}

impl SameYearProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["seed"])?;
        Ok(Self {
            seed: params.seed()?,
        })
    }
}

impl Provider for SameYearProvider {
    fn strategy(&self) -> &str {
        "sameyear"
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let text = input_text(original)?;
        if text.is_empty() {
            return Ok(Value::Null);
        }

        let date = text
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .ok_or_else(|| ProviderError::new("value is not a YYYY-MM-DD date"))?;

        let year = date.year();
        let days = NaiveDate::from_ymd_opt(year, 12, 31).map_or(365, |d| d.ordinal());
        let mut rng = seeded_rng(self.seed, "sameyear", &text);
        let ordinal = rng.gen_range(1..=days);
        let out = NaiveDate::from_yo_opt(year, ordinal)
            .ok_or_else(|| ProviderError::new(format!("no day {ordinal} in year {year}")))?;

        Ok(Value::String(out.format("%Y-%m-%d").to_string()))
    }

    fn is_deterministic(&self) -> bool {
        self.seed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::alter;
    use serde_json::{json, Map};

    fn random(kind: RandomKind, strategy: &str, seed: Option<u64>) -> RandomIdProvider {
        let map = match seed {
            Some(seed) => json!({ "seed": seed }).as_object().cloned().unwrap(),
            None => Map::new(),
        };
        RandomIdProvider::from_params(kind, Params::new(strategy, &map)).unwrap()
    }

    #[test]
    fn test_uuid4_format() {
        let provider = random(RandomKind::Uuid, "uuid4", None);
        let value = alter(&provider, json!("anything")).unwrap();
        let parsed = Uuid::parse_str(value.as_str().unwrap()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert!(!provider.is_deterministic());
    }

    #[test]
    fn test_apikey_seeded_is_stable() {
        let provider = random(RandomKind::Uuid, "apikey", Some(42));
        assert_eq!(
            alter(&provider, json!("key-1")).unwrap(),
            alter(&provider, json!("key-1")).unwrap()
        );
        assert_ne!(
            alter(&provider, json!("key-1")).unwrap(),
            alter(&provider, json!("key-2")).unwrap()
        );
    }

    #[test]
    fn test_phone_number_ita() {
        let provider = random(RandomKind::PhoneNumberIta, "phonenumberita", None);
        let value = alter(&provider, json!("+39 333 1234567")).unwrap();
        let text = value.as_str().unwrap();
        assert!(text.starts_with("+003"));
        assert_eq!(text.len(), 13);
        assert!(text[4..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_random_id_card() {
        let provider = random(RandomKind::IdCard, "randomidcard", Some(1));
        let value = alter(&provider, json!("CA12345AB")).unwrap();
        let text = value.as_str().unwrap();
        assert_eq!(text.len(), 9);
        assert!(text[..2].chars().all(|c| c.is_ascii_uppercase()));
        assert!(text[2..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_same_year() {
        let map = json!({"seed": 5}).as_object().cloned().unwrap();
        let provider = SameYearProvider::from_params(Params::new("sameyear", &map)).unwrap();

        let value = alter(&provider, json!("1984-02-29")).unwrap();
        assert!(value.as_str().unwrap().starts_with("1984-"));

        let value = alter(&provider, json!("2001-07-04 10:30:00")).unwrap();
        assert!(value.as_str().unwrap().starts_with("2001-"));

        assert!(alter(&provider, json!("not a date")).is_err());
        assert_eq!(alter(&provider, json!("")).unwrap(), Value::Null);
    }
}
