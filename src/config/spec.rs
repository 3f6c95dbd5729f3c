//! Anonymization schema
//!
//! The YAML document that maps tables and columns to anonymization strategies.
//! It is parsed once at startup and never mutated afterwards.
//!
//! ```yaml
//! truncate: [audit_log]
//! tables:
//!   - table: public.users
//!     primary_key: id
//!     filter: "created_at < now()"
//!     excludes:
//!       - column: email
//!         patterns: ["@company\\.com$"]
//!     columns:
//!       - column: email
//!         provider: { strategy: fake.email, params: { seed: 42 } }
//!       - column: last_name
//!         provider: { name: mask, sign: "*" }
//!         skip_when: { column: role, equals: admin }
//! ```

use crate::domain::errors::PgMaskError;
use crate::domain::ids::{ColumnTarget, TableName};
use crate::domain::result::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Root of the anonymization schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnonymizationSpec {
    /// Tables emptied before any anonymization starts
    #[serde(default)]
    pub truncate: Vec<TableName>,

    /// Tables to anonymize, in execution order
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

impl AnonymizationSpec {
    /// Structural checks that need no database
    ///
    /// # Errors
    ///
    /// [`PgMaskError::DuplicateTable`] when a table is listed twice, or
    /// [`PgMaskError::Configuration`] for any other malformed entry.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(&table.table) {
                return Err(PgMaskError::DuplicateTable(table.table.to_string()));
            }
            table.validate()?;
        }
        Ok(())
    }

    /// Every table that ends up emptied: the top-level list plus `truncate: true` entries
    pub fn tables_to_truncate(&self) -> Vec<TableName> {
        let mut out: Vec<TableName> = Vec::new();
        let flagged = self.tables.iter().filter(|t| t.truncate).map(|t| &t.table);
        for table in self.truncate.iter().chain(flagged) {
            if !out.contains(table) {
                out.push(table.clone());
            }
        }
        out
    }
}

/// One table entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub table: TableName,

    /// Key columns used to address rows; detected from the catalog when absent
    #[serde(default, deserialize_with = "string_or_list")]
    pub primary_key: Option<Vec<String>>,

    /// Per-table batch size override
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Row filter (a trusted SQL boolean expression)
    #[serde(default, alias = "search")]
    pub filter: Option<String>,

    /// Empty the table instead of anonymizing it
    #[serde(default)]
    pub truncate: bool,

    /// Rows matching any of these are left untouched
    #[serde(default)]
    pub excludes: Vec<ExcludeRule>,

    /// Column rules, applied in order
    #[serde(default, alias = "fields")]
    pub columns: Vec<ColumnRule>,
}

impl TableSpec {
    fn validate(&self) -> Result<()> {
        let table = &self.table;

        if self.batch_size == Some(0) {
            return Err(PgMaskError::Configuration(format!(
                "Table '{table}': batch_size must be > 0"
            )));
        }

        if let Some(keys) = &self.primary_key {
            if keys.is_empty() || keys.iter().any(|k| k.trim().is_empty()) {
                return Err(PgMaskError::Configuration(format!(
                    "Table '{table}': primary_key cannot be empty"
                )));
            }
        }

        if !self.truncate && self.columns.is_empty() {
            return Err(PgMaskError::Configuration(format!(
                "Table '{table}' declares no columns and is not truncated"
            )));
        }

        for exclude in &self.excludes {
            if exclude.patterns.is_empty() {
                return Err(PgMaskError::Configuration(format!(
                    "Table '{table}': exclude rule on '{}' has no patterns",
                    exclude.column
                )));
            }
            for pattern in &exclude.patterns {
                check_regex(table, pattern)?;
            }
        }

        for rule in &self.columns {
            if rule.provider.strategy.trim().is_empty() {
                return Err(PgMaskError::Configuration(format!(
                    "Table '{table}': column '{}' has an empty strategy",
                    rule.column
                )));
            }
            if let Some(SkipCondition {
                predicate: Predicate::Matches(pattern),
                ..
            }) = &rule.skip_when
            {
                check_regex(table, pattern)?;
            }
        }

        Ok(())
    }
}

/// Row-level exclusion: rows whose `column` matches any pattern are skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExcludeRule {
    pub column: String,
    pub patterns: Vec<String>,
}

/// Binds one column (or JSON sub-field) to a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnRule {
    pub column: ColumnTarget,

    pub provider: ProviderRef,

    /// Leave the column unchanged on rows where this holds
    #[serde(default)]
    pub skip_when: Option<SkipCondition>,

    /// Suffix appended to the provider output
    #[serde(default)]
    pub append: Option<String>,

    /// Output template; `{pga_value}` is the provider output, `{col}` another column
    #[serde(default)]
    pub format: Option<String>,

    /// Allows further rules on the same target; later rules overwrite earlier ones
    #[serde(default)]
    pub composable: bool,
}

/// Strategy name plus parameters
///
/// Parameters may be nested under `params` or written inline next to the
/// strategy name; both forms merge into [`ProviderRef::params`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawProviderRef")]
pub struct ProviderRef {
    pub strategy: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ProviderRef {
    pub fn new(strategy: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            strategy: strategy.into(),
            params,
        }
    }

    /// Canonical key; equal deterministic refs share one provider instance
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.strategy, Value::Object(self.params.clone()))
    }
}

#[derive(Deserialize)]
struct RawProviderRef {
    #[serde(alias = "name")]
    strategy: String,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(flatten)]
    inline: Map<String, Value>,
}

impl From<RawProviderRef> for ProviderRef {
    fn from(raw: RawProviderRef) -> Self {
        let mut params = raw.inline;
        params.extend(raw.params);
        Self {
            strategy: raw.strategy,
            params,
        }
    }
}

/// Per-row predicate on one column of the original row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipCondition {
    pub column: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    IsNull(bool),
    IsNotNull(bool),
    /// Regular expression on the text form of the value
    Matches(String),
}

fn check_regex(table: &TableName, pattern: &str) -> Result<()> {
    regex::Regex::new(pattern).map(|_| ()).map_err(|e| {
        PgMaskError::Configuration(format!("Table '{table}': invalid pattern '{pattern}': {e}"))
    })
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(
        Option::<OneOrMany>::deserialize(deserializer)?.map(|keys| match keys {
            OneOrMany::One(key) => vec![key],
            OneOrMany::Many(keys) => keys,
        }),
    )
}
