//! Transformation engine
//!
//! Applies a table's compiled rules to one batch. Providers see the original
//! row; results go to a working copy that only becomes an [`UpdatedRow`] once
//! every rule of that row has succeeded.

use crate::config::schema::FailurePolicy;
use crate::core::compiler::{
    CompiledCondition, CompiledPredicate, CompiledRule, CompiledTable, Segment, Template,
};
use crate::domain::errors::{PgMaskError, RowErrorDetail};
use crate::domain::row::{value_as_text, Row, RowBatch, TransformedBatch, UpdatedRow};
use crate::domain::Result;
use crate::providers::{ProviderError, RowContext};
use serde_json::{Map, Value};

/// Stateless per-table transformer
#[derive(Debug, Clone, Copy)]
pub struct TransformEngine<'a> {
    table: &'a CompiledTable,
    policy: FailurePolicy,
}

impl<'a> TransformEngine<'a> {
    pub fn new(table: &'a CompiledTable, policy: FailurePolicy) -> Self {
        Self { table, policy }
    }

    /// Transform every row of `batch`
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::FailFast`] the first provider failure aborts the
    /// batch with [`PgMaskError::ProviderExecution`]; nothing of it is written.
    pub fn transform(&self, batch: RowBatch) -> Result<TransformedBatch> {
        let mut out = TransformedBatch {
            batch_index: batch.batch_index,
            offset: batch.offset,
            rows_read: batch.rows.len(),
            rows: Vec::with_capacity(batch.rows.len()),
            ..Default::default()
        };

        for row in batch.rows {
            if self.is_excluded(&row) {
                out.excluded += 1;
                continue;
            }

            match self.transform_row(&row) {
                Ok(values) => out.rows.push(UpdatedRow {
                    key: row.key,
                    values,
                }),
                Err((target, error)) => {
                    let detail = RowErrorDetail {
                        table: self.table.table.to_string(),
                        column: target,
                        batch_index: batch.batch_index,
                        primary_key: row.key,
                        message: error.to_string(),
                    };
                    match self.policy {
                        FailurePolicy::FailFast => {
                            return Err(PgMaskError::ProviderExecution(detail));
                        }
                        FailurePolicy::SkipRow => {
                            tracing::warn!(
                                table = %detail.table,
                                column = %detail.column,
                                batch = detail.batch_index,
                                key = ?detail.primary_key,
                                error = %detail.message,
                                "Provider failed, row left unchanged"
                            );
                            out.failures.push(detail);
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    fn is_excluded(&self, row: &Row) -> bool {
        self.table.excludes.iter().any(|exclude| {
            row.values
                .get(exclude.slot)
                .and_then(value_as_text)
                .is_some_and(|text| exclude.patterns.iter().any(|p| p.is_match(&text)))
        })
    }

    /// Values for the write columns, or the failing target and its error
    fn transform_row(&self, row: &Row) -> std::result::Result<Vec<Value>, (String, ProviderError)> {
        let ctx = RowContext::new(&self.table.read.columns, &row.values);
        let mut working = row.values.clone();

        for rule in &self.table.rules {
            if rule
                .skip_when
                .as_ref()
                .is_some_and(|condition| condition_holds(condition, &row.values))
            {
                continue;
            }

            apply_rule(rule, &row.values, &mut working, &ctx)
                .map_err(|e| (rule.target.to_string(), e))?;
        }

        Ok(self
            .table
            .write_slots
            .iter()
            .map(|&slot| std::mem::take(&mut working[slot]))
            .collect())
    }
}

fn apply_rule(
    rule: &CompiledRule,
    original: &[Value],
    working: &mut [Value],
    ctx: &RowContext<'_>,
) -> std::result::Result<(), ProviderError> {
    let input = lookup(&original[rule.slot], rule.target.path()).unwrap_or(&Value::Null);
    if input.is_null() && !rule.provider.handles_null() {
        return Ok(());
    }

    let mut output = rule.provider.alter_value(input, ctx)?;
    if let Some(suffix) = &rule.append {
        output = append(output, suffix);
    }
    if let Some(template) = &rule.format {
        output = render(template, &output, working);
    }

    if rule.target.is_json_field() {
        assign(&mut working[rule.slot], rule.target.path(), output)
    } else {
        working[rule.slot] = output;
        Ok(())
    }
}

fn condition_holds(condition: &CompiledCondition, original: &[Value]) -> bool {
    let value = original.get(condition.slot).unwrap_or(&Value::Null);
    match &condition.predicate {
        CompiledPredicate::Equals(expected) => same_value(value, expected),
        CompiledPredicate::NotEquals(expected) => !same_value(value, expected),
        CompiledPredicate::In(candidates) => candidates.iter().any(|c| same_value(value, c)),
        CompiledPredicate::IsNull(wanted) => value.is_null() == *wanted,
        CompiledPredicate::IsNotNull(wanted) => !value.is_null() == *wanted,
        CompiledPredicate::Matches(regex) => {
            value_as_text(value).is_some_and(|text| regex.is_match(&text))
        }
    }
}

/// Columns arrive as text, so `3` in the schema file must equal `"3"` read back
fn same_value(actual: &Value, expected: &Value) -> bool {
    value_as_text(actual) == value_as_text(expected)
}

fn lookup<'v>(value: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter()
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

fn assign(
    root: &mut Value,
    path: &[String],
    new_value: Value,
) -> std::result::Result<(), ProviderError> {
    let Some((last, parents)) = path.split_last() else {
        *root = new_value;
        return Ok(());
    };

    let mut current = root;
    for key in parents {
        current = object_mut(current, key)?
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    object_mut(current, last)?.insert(last.clone(), new_value);
    Ok(())
}

fn object_mut<'v>(
    value: &'v mut Value,
    key: &str,
) -> std::result::Result<&'v mut Map<String, Value>, ProviderError> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| ProviderError::new(format!("cannot set field '{key}' on a non-object")))
}

fn append(output: Value, suffix: &str) -> Value {
    match output {
        Value::Null => Value::Null,
        Value::String(mut s) => {
            s.push_str(suffix);
            Value::String(s)
        }
        other => Value::String(format!("{other}{suffix}")),
    }
}

fn render(template: &Template, output: &Value, working: &[Value]) -> Value {
    let mut rendered = String::new();
    for segment in &template.segments {
        match segment {
            Segment::Literal(text) => rendered.push_str(text),
            Segment::Value => rendered.push_str(&value_as_text(output).unwrap_or_default()),
            Segment::Column(slot) => {
                if let Some(text) = working.get(*slot).and_then(value_as_text) {
                    rendered.push_str(&text);
                }
            }
        }
    }
    Value::String(rendered)
}
