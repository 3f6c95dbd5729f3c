//! Domain error types
//!
//! This module defines the error hierarchy for pgmask. Errors are grouped the
//! way the anonymization run treats them:
//!
//! - configuration errors are fatal and raised before anything is executed
//! - schema mismatches are fatal for one table, raised before any row is read
//! - provider failures on a row are subject to the [`FailurePolicy`]
//! - batch write failures stop the remaining batches of one table
//! - cancellation is a graceful abort, not a fault
//!
//! Database errors never expose `tokio_postgres` types.
//!
//! [`FailurePolicy`]: crate::config::FailurePolicy

use thiserror::Error;

/// Main pgmask error type
#[derive(Debug, Error)]
pub enum PgMaskError {
    /// Configuration-related errors (invalid values, missing files)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A strategy name that no registered provider matches
    #[error("Unknown anonymization strategy: {0}")]
    UnknownStrategy(String),

    /// Provider parameters rejected by the provider itself
    #[error("Invalid parameters for strategy '{strategy}': {message}")]
    InvalidParameter { strategy: String, message: String },

    /// The same table appears twice in one anonymization schema
    #[error("Table '{0}' is declared more than once")]
    DuplicateTable(String),

    /// A rule does not fit the live table schema
    #[error("Schema mismatch on table '{table}': {message}")]
    SchemaMismatch { table: String, message: String },

    /// A provider failed on a specific row
    #[error("Provider failed: {0}")]
    ProviderExecution(RowErrorDetail),

    /// A batch could not be written
    #[error("Batch write failed: {0}")]
    BatchWrite(BatchErrorDetail),

    /// Run or table cancelled by a shutdown signal
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Table never started because an earlier table failed
    #[error("Aborted: {0}")]
    Aborted(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl PgMaskError {
    /// Whether this error belongs to the pre-execution configuration class
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PgMaskError::Configuration(_)
                | PgMaskError::UnknownStrategy(_)
                | PgMaskError::InvalidParameter { .. }
                | PgMaskError::DuplicateTable(_)
        )
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            PgMaskError::Database(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the error is a cancellation rather than a fault
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PgMaskError::Cancelled(_))
    }
}

/// Database errors
///
/// Errors raised by a [`DatabaseClient`](crate::adapters::database::DatabaseClient)
/// implementation.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect or the connection was lost
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No pooled session became available in time
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// A statement failed
    #[error("Query failed: {message}")]
    QueryFailed { message: String, transient: bool },

    /// A call exceeded its timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// BEGIN/COMMIT/ROLLBACK failed
    #[error("Transaction failed: {message}")]
    TransactionFailed { message: String, transient: bool },
}

impl DatabaseError {
    /// Connection drops, serialization failures, deadlocks and timeouts are
    /// worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::ConnectionFailed(_)
            | DatabaseError::PoolExhausted(_)
            | DatabaseError::Timeout(_) => true,
            DatabaseError::QueryFailed { transient, .. }
            | DatabaseError::TransactionFailed { transient, .. } => *transient,
        }
    }
}

/// Context for a provider failure on a single row
#[derive(Debug, Clone, PartialEq)]
pub struct RowErrorDetail {
    /// Table being anonymized
    pub table: String,

    /// Target column (may include a JSON path)
    pub column: String,

    /// Zero-based batch index within the table
    pub batch_index: usize,

    /// Primary key values of the row
    pub primary_key: Vec<String>,

    /// Error message from the provider
    pub message: String,
}

impl std::fmt::Display for RowErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "table={} column={} batch={} key=[{}]: {}",
            self.table,
            self.column,
            self.batch_index,
            self.primary_key.join(", "),
            self.message
        )
    }
}

/// Context for a batch that could not be written
#[derive(Debug, Clone, PartialEq)]
pub struct BatchErrorDetail {
    /// Table being anonymized
    pub table: String,

    /// Zero-based batch index within the table
    pub batch_index: usize,

    /// Number of rows read before this batch
    pub batch_offset: u64,

    /// Attempts made, including the first
    pub attempts: usize,

    /// Primary keys of the rows in the batch
    pub primary_keys: Vec<Vec<String>>,

    /// Last error message
    pub message: String,
}

impl std::fmt::Display for BatchErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "table={} batch={} offset={} rows={} attempts={}: {}",
            self.table,
            self.batch_index,
            self.batch_offset,
            self.primary_keys.len(),
            self.attempts,
            self.message
        )
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for PgMaskError {
    fn from(err: std::io::Error) -> Self {
        PgMaskError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for PgMaskError {
    fn from(err: serde_json::Error) -> Self {
        PgMaskError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for PgMaskError {
    fn from(err: toml::de::Error) -> Self {
        PgMaskError::Configuration(format!("TOML parse error: {err}"))
    }
}

// Conversion from YAML parse errors
impl From<serde_yaml::Error> for PgMaskError {
    fn from(err: serde_yaml::Error) -> Self {
        PgMaskError::Configuration(format!("YAML parse error: {err}"))
    }
}
