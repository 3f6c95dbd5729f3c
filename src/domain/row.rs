//! Row, batch and table-shape types shared by the reader, engine and writer.

use crate::domain::errors::RowErrorDetail;
use crate::domain::ids::TableName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// A column as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// SQL type as rendered by `format_type()`, e.g. `character varying(255)`
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// json and jsonb columns are parsed on read so sub-fields can be targeted
    pub fn is_json(&self) -> bool {
        matches!(self.data_type.as_str(), "json" | "jsonb")
    }
}

/// Live shape of a table at execution time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: TableName,
    pub columns: Vec<ColumnInfo>,

    /// Primary key columns in key order (empty when the table has none)
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// What the row stream reader selects from one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    pub table: TableName,

    /// Key columns; their values arrive as text in [`Row::key`]
    pub key_columns: Vec<ColumnInfo>,

    /// Value columns; their values arrive in [`Row::values`] in this order
    pub columns: Vec<ColumnInfo>,

    /// Trusted SQL fragment appended as `WHERE (...)`
    pub filter: Option<String>,

    pub batch_size: usize,
}

/// What the batch writer updates in one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub table: TableName,
    pub key_columns: Vec<ColumnInfo>,

    /// Updated columns; aligned with [`UpdatedRow::values`]
    pub target_columns: Vec<ColumnInfo>,
}

/// One source row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Primary key values as text
    pub key: Vec<String>,

    /// Column values aligned with [`ReadPlan::columns`]
    pub values: Vec<Value>,
}

/// A bounded group of rows read from a table
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    /// Zero-based index of the batch within its table
    pub batch_index: usize,

    /// Rows read before this batch
    pub offset: u64,

    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// New values for one row, aligned with [`WritePlan::target_columns`]
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedRow {
    pub key: Vec<String>,
    pub values: Vec<Value>,
}

/// Output of the transformation engine for one [`RowBatch`]
#[derive(Debug, Clone, Default)]
pub struct TransformedBatch {
    pub batch_index: usize,
    pub offset: u64,

    /// Rows in the source batch
    pub rows_read: usize,

    /// Rows to write back
    pub rows: Vec<UpdatedRow>,

    /// Rows left untouched by an exclusion rule
    pub excluded: usize,

    /// Rows left untouched because a provider failed under the skip-row policy
    pub failures: Vec<RowErrorDetail>,
}

impl TransformedBatch {
    /// Rows not written back, for any reason
    pub fn skipped(&self) -> usize {
        self.excluded + self.failures.len()
    }

    pub fn primary_keys(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(|r| r.key.clone()).collect()
    }
}

/// Text form of a value as PostgreSQL would print it, `None` for NULL
///
/// Strings are returned verbatim, everything else as compact JSON.
pub fn value_as_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => Some(Cow::Owned(other.to_string())),
    }
}
