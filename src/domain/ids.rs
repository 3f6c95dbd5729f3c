//! Identifier types with validation
//!
//! Newtype wrappers for the database identifiers an anonymization schema refers
//! to. Both parse from the plain strings used in the schema file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default PostgreSQL schema for unqualified table names
pub const DEFAULT_SCHEMA: &str = "public";

/// Schema-qualified table name
///
/// Parses `table` or `schema.table`; unqualified names land in `public`.
///
/// # Examples
///
/// ```
/// use pgmask::domain::ids::TableName;
/// use std::str::FromStr;
///
/// let table = TableName::from_str("auth_user").unwrap();
/// assert_eq!(table.schema(), "public");
/// assert_eq!(table.to_string(), "public.auth_user");
/// assert_eq!(table.quoted(), "\"public\".\"auth_user\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName {
    schema: String,
    name: String,
}

impl TableName {
    /// Creates a new TableName from a possibly qualified string
    pub fn new(value: impl AsRef<str>) -> Result<Self, String> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err("Table name cannot be empty".to_string());
        }

        let (schema, name) = match value.split_once('.') {
            Some((schema, name)) => (schema.trim(), name.trim()),
            None => (DEFAULT_SCHEMA, value),
        };

        if schema.is_empty() || name.is_empty() || name.contains('.') {
            return Err(format!(
                "Invalid table name '{value}'. Expected 'table' or 'schema.table'"
            ));
        }

        Ok(Self {
            schema: schema.to_string(),
            name: name.to_string(),
        })
    }

    /// Returns the schema part
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the unqualified table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name as a quoted SQL identifier
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for TableName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.to_string()
    }
}

/// A rule target: a column, optionally narrowed to a JSON field path
///
/// `profile.address.city` addresses the `city` key inside the `address` object
/// of the json/jsonb column `profile`.
///
/// # Examples
///
/// ```
/// use pgmask::domain::ids::ColumnTarget;
///
/// let target = ColumnTarget::new("profile.address.city").unwrap();
/// assert_eq!(target.column(), "profile");
/// assert_eq!(target.path(), ["address", "city"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnTarget {
    column: String,
    path: Vec<String>,
}

impl ColumnTarget {
    /// Creates a new ColumnTarget from dot notation
    pub fn new(value: impl AsRef<str>) -> Result<Self, String> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err("Column name cannot be empty".to_string());
        }

        let mut parts = value.split('.').map(str::trim);
        let column = parts.next().unwrap_or_default().to_string();
        let path: Vec<String> = parts.map(str::to_string).collect();

        if column.is_empty() || path.iter().any(String::is_empty) {
            return Err(format!("Invalid column reference '{value}'"));
        }

        Ok(Self { column, path })
    }

    /// The database column
    pub fn column(&self) -> &str {
        &self.column
    }

    /// JSON path inside the column (empty for whole-column targets)
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Whether the target addresses a JSON field rather than the whole column
    pub fn is_json_field(&self) -> bool {
        !self.path.is_empty()
    }
}

impl fmt::Display for ColumnTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column)?;
        for segment in &self.path {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for ColumnTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ColumnTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ColumnTarget> for String {
    fn from(value: ColumnTarget) -> Self {
        value.to_string()
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
