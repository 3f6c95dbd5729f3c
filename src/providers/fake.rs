//! Fake data provider backed by the `fake` crate
//!
//! Resolved for any strategy of the form `fake.<kind>` or `fake_<kind>`,
//! e.g. `fake.email`, `fake_first_name`.

use super::random::uuid_v4;
use super::{input_text, seeded_rng, Params, Provider, ProviderError, RowContext};
use crate::domain::result::Result;
use fake::faker::address::raw::{CityName, CountryName, StreetName, ZipCode};
use fake::faker::company::raw::CompanyName;
use fake::faker::internet::raw::{FreeEmail, IPv4, SafeEmail, Username};
use fake::faker::lorem::raw::{Sentence, Word};
use fake::faker::name::raw::{FirstName, LastName, Name};
use fake::faker::phone_number::raw::PhoneNumber;
use fake::locales::{Data, EN, FR_FR, PT_BR, ZH_CN, ZH_TW};
use fake::Fake;
use rand::rngs::StdRng;
use serde_json::Value;
use std::str::FromStr;

/// Draws before giving up on producing a value different from the original
const MAX_DRAWS: usize = 32;

/// Kind of fake value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeKind {
    Email,
    SafeEmail,
    FirstName,
    LastName,
    Name,
    UserName,
    PhoneNumber,
    CompanyName,
    City,
    StreetName,
    ZipCode,
    Country,
    Word,
    Sentence,
    Ipv4,
    Uuid,
}

impl FakeKind {
    pub const ALL: [&'static str; 16] = [
        "email",
        "safe_email",
        "first_name",
        "last_name",
        "name",
        "user_name",
        "phone_number",
        "company_name",
        "city",
        "street_name",
        "zip_code",
        "country",
        "word",
        "sentence",
        "ipv4",
        "uuid",
    ];

    /// Canonical name; aliases of one kind share it
    pub fn as_str(self) -> &'static str {
        match self {
            FakeKind::Email => "email",
            FakeKind::SafeEmail => "safe_email",
            FakeKind::FirstName => "first_name",
            FakeKind::LastName => "last_name",
            FakeKind::Name => "name",
            FakeKind::UserName => "user_name",
            FakeKind::PhoneNumber => "phone_number",
            FakeKind::CompanyName => "company_name",
            FakeKind::City => "city",
            FakeKind::StreetName => "street_name",
            FakeKind::ZipCode => "zip_code",
            FakeKind::Country => "country",
            FakeKind::Word => "word",
            FakeKind::Sentence => "sentence",
            FakeKind::Ipv4 => "ipv4",
            FakeKind::Uuid => "uuid",
        }
    }
}

impl FromStr for FakeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "email" | "free_email" => FakeKind::Email,
            "safe_email" => FakeKind::SafeEmail,
            "first_name" => FakeKind::FirstName,
            "last_name" => FakeKind::LastName,
            "name" => FakeKind::Name,
            "user_name" | "username" => FakeKind::UserName,
            "phone_number" => FakeKind::PhoneNumber,
            "company" | "company_name" => FakeKind::CompanyName,
            "city" => FakeKind::City,
            "street_name" => FakeKind::StreetName,
            "zip_code" | "postcode" => FakeKind::ZipCode,
            "country" => FakeKind::Country,
            "word" => FakeKind::Word,
            "sentence" => FakeKind::Sentence,
            "ipv4" => FakeKind::Ipv4,
            "uuid" | "uuid4" => FakeKind::Uuid,
            other => {
                return Err(format!(
                    "unknown fake kind '{other}' (supported: {})",
                    FakeKind::ALL.join(", ")
                ))
            }
        })
    }
}

/// Locales with generator data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    FrFr,
    PtBr,
    ZhCn,
    ZhTw,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "en" | "en_us" | "en_gb" => Ok(Locale::En),
            "fr" | "fr_fr" => Ok(Locale::FrFr),
            "pt" | "pt_br" => Ok(Locale::PtBr),
            "zh" | "zh_cn" => Ok(Locale::ZhCn),
            "zh_tw" => Ok(Locale::ZhTw),
            other => Err(format!(
                "unsupported locale '{other}' (supported: en, fr_FR, pt_BR, zh_CN, zh_TW)"
            )),
        }
    }
}

fn generate<L: Data + Copy>(kind: FakeKind, locale: L, rng: &mut StdRng) -> String {
    match kind {
        FakeKind::Email => FreeEmail(locale).fake_with_rng(rng),
        FakeKind::SafeEmail => SafeEmail(locale).fake_with_rng(rng),
        FakeKind::FirstName => FirstName(locale).fake_with_rng(rng),
        FakeKind::LastName => LastName(locale).fake_with_rng(rng),
        FakeKind::Name => Name(locale).fake_with_rng(rng),
        FakeKind::UserName => Username(locale).fake_with_rng(rng),
        FakeKind::PhoneNumber => PhoneNumber(locale).fake_with_rng(rng),
        FakeKind::CompanyName => CompanyName(locale).fake_with_rng(rng),
        FakeKind::City => CityName(locale).fake_with_rng(rng),
        FakeKind::StreetName => StreetName(locale).fake_with_rng(rng),
        FakeKind::ZipCode => ZipCode(locale).fake_with_rng(rng),
        FakeKind::Country => CountryName(locale).fake_with_rng(rng),
        FakeKind::Word => Word(locale).fake_with_rng(rng),
        FakeKind::Sentence => Sentence(locale, 4..10).fake_with_rng(rng),
        FakeKind::Ipv4 => IPv4(locale).fake_with_rng(rng),
        FakeKind::Uuid => uuid_v4(rng).to_string(),
    }
}

/// Replaces values with generated fake data
///
/// With a `seed`, the output is a function of the seed and the original value.
/// The output never equals the original.
#[derive(Debug)]
pub struct FakeProvider {
    strategy: String,
    kind: FakeKind,
    locale: Locale,
    seed: Option<u64>,
}

impl FakeProvider {
    pub fn from_params(params: Params<'_>) -> Result<Self> {
        params.allow_only(&["locale", "seed"])?;

        let strategy = params.strategy();
        let kind_name = strategy
            .strip_prefix("fake.")
            .or_else(|| strategy.strip_prefix("fake_"))
            .ok_or_else(|| params.invalid("expected 'fake.<kind>' or 'fake_<kind>'"))?;
        let kind = kind_name.parse().map_err(|e: String| params.invalid(e))?;

        let locale = match params.str("locale")? {
            Some(locale) => locale.parse().map_err(|e: String| params.invalid(e))?,
            None => Locale::default(),
        };

        Ok(Self {
            strategy: strategy.to_string(),
            kind,
            locale,
            seed: params.seed()?,
        })
    }

    fn draw(&self, rng: &mut StdRng) -> String {
        match self.locale {
            Locale::En => generate(self.kind, EN, rng),
            Locale::FrFr => generate(self.kind, FR_FR, rng),
            Locale::PtBr => generate(self.kind, PT_BR, rng),
            Locale::ZhCn => generate(self.kind, ZH_CN, rng),
            Locale::ZhTw => generate(self.kind, ZH_TW, rng),
        }
    }
}

impl Provider for FakeProvider {
    fn strategy(&self) -> &str {
        &self.strategy
    }

    fn alter_value(
        &self,
        original: &Value,
        _ctx: &RowContext<'_>,
    ) -> std::result::Result<Value, ProviderError> {
        let text = input_text(original)?;
        let scope = format!("fake.{}", self.kind.as_str());
        let mut rng = seeded_rng(self.seed, &scope, &text);

        for _ in 0..MAX_DRAWS {
            let candidate = self.draw(&mut rng);
            if candidate != text {
                return Ok(Value::String(candidate));
            }
        }

        Err(ProviderError::new(format!(
            "could not generate a value different from the original after {MAX_DRAWS} draws"
        )))
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

    fn fake(strategy: &str, params: Value) -> Result<FakeProvider> {
        let map = params.as_object().cloned().unwrap_or_else(Map::new);
        FakeProvider::from_params(Params::new(strategy, &map))
    }

    #[test]
    fn test_kind_from_strategy() {
        assert_eq!(fake("fake.email", json!({})).unwrap().kind, FakeKind::Email);
        assert_eq!(
            fake("fake_first_name", json!({})).unwrap().kind,
            FakeKind::FirstName
        );
        assert!(fake("fake.horoscope", json!({})).is_err());
    }

    #[test]
    fn test_locale_param() {
        let provider = fake("fake.city", json!({"locale": "fr_FR"})).unwrap();
        assert_eq!(provider.locale, Locale::FrFr);
        assert!(fake("fake.city", json!({"locale": "tlh"})).is_err());
    }

    #[test]
    fn test_seeded_email_is_stable_and_differs() {
        let provider = fake("fake_email", json!({"seed": 42})).unwrap();
        let a1 = alter(&provider, json!("a@x.com")).unwrap();
        let a2 = alter(&provider, json!("a@x.com")).unwrap();
        let b = alter(&provider, json!("b@x.com")).unwrap();

        assert_eq!(a1, a2);
        assert_ne!(a1, json!("a@x.com"));
        assert_ne!(b, json!("b@x.com"));
        assert!(a1.as_str().unwrap().contains('@'));
        assert!(provider.is_deterministic());
    }

    #[test]
    fn test_same_seed_across_instances() {
        let first = fake("fake.name", json!({"seed": 7})).unwrap();
        let second = fake("fake.name", json!({"seed": 7})).unwrap();
        assert_eq!(
            alter(&first, json!("Ada Lovelace")).unwrap(),
            alter(&second, json!("Ada Lovelace")).unwrap()
        );
    }

    #[test]
    fn test_aliases_share_seeded_output() {
        let dotted = fake("fake.email", json!({"seed": 42})).unwrap();
        let underscored = fake("fake_email", json!({"seed": 42})).unwrap();
        let legacy = fake("fake.free_email", json!({"seed": 42})).unwrap();

        let expected = alter(&dotted, json!("a@x.com")).unwrap();
        assert_eq!(alter(&underscored, json!("a@x.com")).unwrap(), expected);
        assert_eq!(alter(&legacy, json!("a@x.com")).unwrap(), expected);
    }

    #[test]
    fn test_every_kind_generates() {
        for kind in FakeKind::ALL {
            let provider = fake(&format!("fake.{kind}"), json!({"seed": 1})).unwrap();
            let value = alter(&provider, json!("original")).unwrap();
            assert!(
                !value.as_str().unwrap().is_empty(),
                "kind {kind} produced an empty value"
            );
        }
    }
}
