//! Provider registry and the per-run provider set
//!
//! Registration is static: [`ProviderRegistry::builtin`] lists every strategy
//! the binary ships. Resolution turns a [`ProviderRef`] into a live provider,
//! and [`ProviderSet`] does that once per run for the whole schema.

use super::basic::{ChoiceProvider, ClearProvider, JsonStringProvider, SequenceProvider, SetProvider};
use super::fake::FakeProvider;
use super::hash::{HashProvider, ItalianId, ItalianIdProvider, Md5Provider};
use super::mask::{MaskProvider, PartialMaskProvider};
use super::random::{RandomIdProvider, RandomKind, SameYearProvider};
use super::{Params, Provider};
use crate::config::spec::{AnonymizationSpec, ProviderRef};
use crate::domain::errors::PgMaskError;
use crate::domain::ids::TableName;
use crate::domain::result::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a provider from its validated parameters
pub type ProviderFactory = fn(Params<'_>) -> Result<Arc<dyn Provider>>;

/// How a registration matches strategy names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// The strategy name equals the id
    Exact,
    /// The strategy name starts with one of these prefixes
    Prefix(&'static [&'static str]),
}

#[derive(Clone, Copy)]
struct Registration {
    id: &'static str,
    matcher: Matcher,
    description: &'static str,
    factory: ProviderFactory,
}

impl Registration {
    fn matches(&self, strategy: &str) -> bool {
        match self.matcher {
            Matcher::Exact => self.id == strategy,
            Matcher::Prefix(prefixes) => prefixes
                .iter()
                .any(|p| strategy.len() > p.len() && strategy.starts_with(p)),
        }
    }
}

/// Maps strategy names to provider factories
pub struct ProviderRegistry {
    registrations: Vec<Registration>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.registrations.iter().map(|r| r.id))
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

macro_rules! factory {
    ($provider:ident) => {
        |params| Ok(Arc::new($provider::from_params(params)?))
    };
    ($provider:ident, $kind:expr) => {
        |params| Ok(Arc::new($provider::from_params($kind, params)?))
    };
}

const BUILTIN: &[(&str, Matcher, &str, ProviderFactory)] = &[
    ("choice", Matcher::Exact, "Random element of `values`", factory!(ChoiceProvider)),
    ("clear", Matcher::Exact, "Set the column to NULL", factory!(ClearProvider)),
    ("set_null", Matcher::Exact, "Set the column to NULL", factory!(ClearProvider)),
    ("set", Matcher::Exact, "Set a static `value`", factory!(SetProvider)),
    (
        "fake",
        Matcher::Prefix(&["fake.", "fake_"]),
        "Fake data: fake.<kind> with optional `locale` and `seed`",
        factory!(FakeProvider),
    ),
    ("mask", Matcher::Exact, "Replace every character with `sign`", factory!(MaskProvider)),
    (
        "partial_mask",
        Matcher::Exact,
        "Mask all but `unmasked_left`/`unmasked_right` characters",
        factory!(PartialMaskProvider),
    ),
    (
        "md5",
        Matcher::Exact,
        "MD5 hex digest, or a number with `as_number`",
        factory!(Md5Provider),
    ),
    (
        "hash",
        Matcher::Exact,
        "Salted SHA-256 hex digest (`salt`, `length`)",
        factory!(HashProvider),
    ),
    (
        "uuid4",
        Matcher::Exact,
        "Random UUID v4",
        factory!(RandomIdProvider, RandomKind::Uuid),
    ),
    (
        "apikey",
        Matcher::Exact,
        "Random UUID v4 used as an API key",
        factory!(RandomIdProvider, RandomKind::Uuid),
    ),
    (
        "fiscalcode",
        Matcher::Exact,
        "Pseudonymous Italian personal fiscal code",
        factory!(ItalianIdProvider, ItalianId::FiscalCode),
    ),
    (
        "vatnumber",
        Matcher::Exact,
        "Pseudonymous Italian VAT number",
        factory!(ItalianIdProvider, ItalianId::VatNumber),
    ),
    (
        "fiscalcodebusiness",
        Matcher::Exact,
        "Pseudonymous Italian business fiscal code",
        factory!(ItalianIdProvider, ItalianId::FiscalCodeBusiness),
    ),
    (
        "fiscalcodevat",
        Matcher::Exact,
        "Business or personal fiscal code, chosen by the input",
        factory!(ItalianIdProvider, ItalianId::FiscalCodeVat),
    ),
    (
        "phonenumberita",
        Matcher::Exact,
        "Random Italian phone number",
        factory!(RandomIdProvider, RandomKind::PhoneNumberIta),
    ),
    (
        "randomidcard",
        Matcher::Exact,
        "Random identity card number",
        factory!(RandomIdProvider, RandomKind::IdCard),
    ),
    (
        "jsonstring",
        Matcher::Exact,
        "Serialized JSON of `object`",
        factory!(JsonStringProvider),
    ),
    (
        "sameyear",
        Matcher::Exact,
        "Random date in the same year as the original",
        factory!(SameYearProvider),
    ),
    (
        "sequence",
        Matcher::Exact,
        "Counter from `start` by `step`, optional `prefix`",
        factory!(SequenceProvider),
    ),
];

impl ProviderRegistry {
    /// A registry with nothing registered
    pub fn empty() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// All providers shipped with pgmask
    pub fn builtin() -> Self {
        Self {
            registrations: BUILTIN
                .iter()
                .map(|&(id, matcher, description, factory)| Registration {
                    id,
                    matcher,
                    description,
                    factory,
                })
                .collect(),
        }
    }

    /// Registers a provider factory
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `id` is already registered.
    pub fn register(
        &mut self,
        id: &'static str,
        matcher: Matcher,
        description: &'static str,
        factory: ProviderFactory,
    ) -> Result<()> {
        if self.registrations.iter().any(|r| r.id == id) {
            return Err(PgMaskError::Configuration(format!(
                "A provider with the id '{id}' has already been registered"
            )));
        }
        self.registrations.push(Registration {
            id,
            matcher,
            description,
            factory,
        });
        Ok(())
    }

    /// Resolves a strategy reference into a provider instance
    ///
    /// Exact ids win over prefix matches.
    ///
    /// # Errors
    ///
    /// [`PgMaskError::UnknownStrategy`] if nothing matches, or
    /// [`PgMaskError::InvalidParameter`] if the provider rejects its parameters.
    pub fn resolve(&self, reference: &ProviderRef) -> Result<Arc<dyn Provider>> {
        let strategy = reference.strategy.as_str();
        let registration = self
            .registrations
            .iter()
            .find(|r| r.matcher == Matcher::Exact && r.matches(strategy))
            .or_else(|| self.registrations.iter().find(|r| r.matches(strategy)))
            .ok_or_else(|| PgMaskError::UnknownStrategy(strategy.to_string()))?;

        (registration.factory)(Params::new(strategy, &reference.params))
    }

    /// `(id, description)` for every registration, in registration order
    pub fn descriptions(&self) -> Vec<(&'static str, &'static str)> {
        self.registrations
            .iter()
            .map(|r| (r.id, r.description))
            .collect()
    }
}

/// Providers resolved for one run
///
/// Deterministic providers are keyed by their canonical reference, so equal
/// references anywhere in the schema share one instance. Any other provider
/// (e.g. `sequence`) is resolved per column rule and keeps its state to that
/// rule.
#[derive(Debug, Default, Clone)]
pub struct ProviderSet {
    shared: HashMap<String, Arc<dyn Provider>>,
    per_rule: HashMap<(TableName, usize), Arc<dyn Provider>>,
}

impl ProviderSet {
    /// Resolves every provider reference in the schema
    ///
    /// # Errors
    ///
    /// Fails on the first reference that does not resolve; nothing has touched
    /// the database at that point.
    pub fn resolve_all(registry: &ProviderRegistry, spec: &AnonymizationSpec) -> Result<Self> {
        let mut set = Self::default();
        for table in &spec.tables {
            for (index, rule) in table.columns.iter().enumerate() {
                set.resolve(registry, &table.table, index, &rule.provider)?;
            }
        }
        Ok(set)
    }

    /// Resolves the provider of rule `index` of `table`
    pub fn resolve(
        &mut self,
        registry: &ProviderRegistry,
        table: &TableName,
        index: usize,
        reference: &ProviderRef,
    ) -> Result<Arc<dyn Provider>> {
        let key = reference.cache_key();
        if let Some(provider) = self.shared.get(&key) {
            return Ok(Arc::clone(provider));
        }
        let provider = registry.resolve(reference)?;
        if provider.is_deterministic() {
            self.shared.insert(key, Arc::clone(&provider));
        } else {
            self.per_rule
                .insert((table.clone(), index), Arc::clone(&provider));
        }
        Ok(provider)
    }

    pub fn get(
        &self,
        table: &TableName,
        index: usize,
        reference: &ProviderRef,
    ) -> Option<Arc<dyn Provider>> {
        self.per_rule
            .get(&(table.clone(), index))
            .or_else(|| self.shared.get(&reference.cache_key()))
            .cloned()
    }

    /// Distinct provider instances
    pub fn len(&self) -> usize {
        self.shared.len() + self.per_rule.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
