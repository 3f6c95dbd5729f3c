//! Column rule compiler
//!
//! Binds a [`TableSpec`] to the live [`TableSchema`] before any row is read:
//! every referenced column is checked, providers are looked up once, regular
//! expressions and format templates are compiled, and the read and write
//! plans are fixed. A table that fails here has had no side effect.

use crate::config::spec::{ColumnRule, Predicate, TableSpec};
use crate::domain::errors::PgMaskError;
use crate::domain::ids::{ColumnTarget, TableName};
use crate::domain::row::{ColumnInfo, ReadPlan, TableSchema, WritePlan};
use crate::domain::Result;
use crate::providers::{Provider, ProviderSet};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Placeholder that stands for the provider output in a `format` template
pub const VALUE_PLACEHOLDER: &str = "pga_value";

/// A table ready for the pipeline
#[derive(Debug)]
pub struct CompiledTable {
    pub table: TableName,
    pub read: ReadPlan,
    pub write: WritePlan,

    /// Rules in declared order
    pub rules: Vec<CompiledRule>,

    pub excludes: Vec<CompiledExclude>,

    /// For each write column, its slot in [`ReadPlan::columns`]
    pub write_slots: Vec<usize>,
}

/// A rule bound to a resolved provider and to read-plan slots
#[derive(Debug)]
pub struct CompiledRule {
    pub target: ColumnTarget,

    /// Slot of the target column in the row values
    pub slot: usize,

    pub provider: Arc<dyn Provider>,
    pub skip_when: Option<CompiledCondition>,
    pub append: Option<String>,
    pub format: Option<Template>,
}

/// Skip condition evaluated against the original row
#[derive(Debug)]
pub struct CompiledCondition {
    pub slot: usize,
    pub predicate: CompiledPredicate,
}

#[derive(Debug)]
pub enum CompiledPredicate {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    IsNull(bool),
    IsNotNull(bool),
    Matches(Regex),
}

/// Row exclusion on one column
#[derive(Debug)]
pub struct CompiledExclude {
    pub column: String,
    pub slot: usize,
    pub patterns: Vec<Regex>,
}

/// Parsed `format` template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    /// Provider output (after `append`)
    Value,
    /// Working value of another column, by slot
    Column(usize),
}

/// Compile one table
///
/// `default_batch_size` applies when the table has no override.
///
/// # Errors
///
/// [`PgMaskError::SchemaMismatch`] when the rules do not fit the live table.
pub fn compile(
    spec: &TableSpec,
    schema: &TableSchema,
    providers: &ProviderSet,
    default_batch_size: usize,
) -> Result<CompiledTable> {
    let mut builder = PlanBuilder::new(&spec.table, schema);

    let key_names = match &spec.primary_key {
        Some(keys) => keys.clone(),
        None => schema.primary_key.clone(),
    };
    if key_names.is_empty() {
        return Err(builder.mismatch(
            "table has no primary key; declare primary_key in the schema file",
        ));
    }
    let key_columns = key_names
        .iter()
        .map(|name| builder.lookup(name).cloned())
        .collect::<Result<Vec<_>>>()?;

    let mut rules = Vec::with_capacity(spec.columns.len());
    let mut targets: HashMap<String, bool> = HashMap::new();
    let mut write_columns: Vec<usize> = Vec::new();

    for (index, rule) in spec.columns.iter().enumerate() {
        let name = rule.column.column();
        if key_names.iter().any(|k| k == name) {
            return Err(builder.mismatch(format!(
                "primary key column '{name}' cannot be anonymized"
            )));
        }

        let slot = builder.slot(name)?;
        if rule.column.is_json_field() && !builder.read[slot].is_json() {
            return Err(builder.mismatch(format!(
                "'{}' addresses a field but column '{name}' is {}, not json/jsonb",
                rule.column, builder.read[slot].data_type
            )));
        }

        let target = rule.column.to_string();
        if let Some(previous_composable) = targets.get(&target) {
            if !(*previous_composable && rule.composable) {
                return Err(builder.mismatch(format!(
                    "'{target}' is targeted by more than one rule; mark them composable"
                )));
            }
        }
        targets.insert(target, rule.composable);

        if !write_columns.contains(&slot) {
            write_columns.push(slot);
        }

        rules.push(compile_rule(rule, index, slot, providers, &mut builder)?);
    }

    let mut excludes = Vec::with_capacity(spec.excludes.len());
    for exclude in &spec.excludes {
        let slot = builder.slot(&exclude.column)?;
        let patterns = exclude
            .patterns
            .iter()
            .map(|p| compile_regex(&spec.table, p))
            .collect::<Result<Vec<_>>>()?;
        excludes.push(CompiledExclude {
            column: exclude.column.clone(),
            slot,
            patterns,
        });
    }

    let target_columns = write_columns
        .iter()
        .map(|&slot| builder.read[slot].clone())
        .collect();

    let read = ReadPlan {
        table: spec.table.clone(),
        key_columns: key_columns.clone(),
        columns: builder.read,
        filter: spec.filter.clone(),
        batch_size: spec.batch_size.unwrap_or(default_batch_size).max(1),
    };
    let write = WritePlan {
        table: spec.table.clone(),
        key_columns,
        target_columns,
    };

    Ok(CompiledTable {
        table: spec.table.clone(),
        read,
        write,
        rules,
        excludes,
        write_slots: write_columns,
    })
}

fn compile_rule(
    rule: &ColumnRule,
    index: usize,
    slot: usize,
    providers: &ProviderSet,
    builder: &mut PlanBuilder<'_>,
) -> Result<CompiledRule> {
    let provider = providers.get(builder.table, index, &rule.provider).ok_or_else(|| {
        PgMaskError::Configuration(format!(
            "Strategy '{}' for '{}' was not resolved",
            rule.provider.strategy, rule.column
        ))
    })?;

    let skip_when = match &rule.skip_when {
        Some(condition) => {
            let predicate = match &condition.predicate {
                Predicate::Equals(v) => CompiledPredicate::Equals(v.clone()),
                Predicate::NotEquals(v) => CompiledPredicate::NotEquals(v.clone()),
                Predicate::In(vs) => CompiledPredicate::In(vs.clone()),
                Predicate::IsNull(b) => CompiledPredicate::IsNull(*b),
                Predicate::IsNotNull(b) => CompiledPredicate::IsNotNull(*b),
                Predicate::Matches(p) => CompiledPredicate::Matches(compile_regex(builder.table, p)?),
            };
            Some(CompiledCondition {
                slot: builder.slot(&condition.column)?,
                predicate,
            })
        }
        None => None,
    };

    let format = match &rule.format {
        Some(text) => Some(parse_template(text, builder)?),
        None => None,
    };

    Ok(CompiledRule {
        target: rule.column.clone(),
        slot,
        provider,
        skip_when,
        append: rule.append.clone().filter(|a| !a.is_empty()),
        format,
    })
}

fn parse_template(text: &str, builder: &mut PlanBuilder<'_>) -> Result<Template> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let name = after.find('}').map(|close| &after[..close]);

        match name.filter(|n| is_identifier(n)) {
            Some(name) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(if name == VALUE_PLACEHOLDER {
                    Segment::Value
                } else {
                    Segment::Column(builder.slot(name)?)
                });
                rest = &after[name.len() + 1..];
            }
            None => {
                literal.push('{');
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(Template { segments })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn compile_regex(table: &TableName, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        PgMaskError::Configuration(format!("Table '{table}': invalid pattern '{pattern}': {e}"))
    })
}

/// Collects the value columns a table needs, in first-use order
struct PlanBuilder<'a> {
    table: &'a TableName,
    schema: &'a TableSchema,
    read: Vec<ColumnInfo>,
}

impl<'a> PlanBuilder<'a> {
    fn new(table: &'a TableName, schema: &'a TableSchema) -> Self {
        Self {
            table,
            schema,
            read: Vec::new(),
        }
    }

    fn mismatch(&self, message: impl Into<String>) -> PgMaskError {
        PgMaskError::SchemaMismatch {
            table: self.table.to_string(),
            message: message.into(),
        }
    }

    fn lookup(&self, name: &str) -> Result<&'a ColumnInfo> {
        self.schema
            .column(name)
            .ok_or_else(|| self.mismatch(format!("column '{name}' does not exist")))
    }

    /// Slot of `name` in the read plan, adding it on first use
    fn slot(&mut self, name: &str) -> Result<usize> {
        if let Some(index) = self.read.iter().position(|c| c.name == name) {
            return Ok(index);
        }
        let column = self.lookup(name)?.clone();
        self.read.push(column);
        Ok(self.read.len() - 1)
    }
}
