//! Domain types for pgmask.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Identifiers** ([`TableName`], [`ColumnTarget`])
//! - **Row and batch types** ([`RowBatch`], [`TransformedBatch`], [`TableSchema`])
//! - **Read/write plans** handed to the database adapter ([`ReadPlan`], [`WritePlan`])
//! - **Error types** ([`PgMaskError`], [`DatabaseError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible library operations return [`Result<T>`]:
//!
//! ```rust
//! use pgmask::domain::{PgMaskError, Result, TableName};
//!
//! fn parse(name: &str) -> Result<TableName> {
//!     TableName::new(name).map_err(PgMaskError::Configuration)
//! }
//!
//! assert!(parse("public.users").is_ok());
//! assert!(parse("").is_err());
//! ```

pub mod errors;
pub mod ids;
pub mod result;
pub mod row;

// Re-export commonly used types for convenience
pub use errors::{BatchErrorDetail, DatabaseError, PgMaskError, RowErrorDetail};
pub use ids::{quote_ident, ColumnTarget, TableName};
pub use result::Result;
pub use row::{
    value_as_text, ColumnInfo, ReadPlan, Row, RowBatch, TableSchema, TransformedBatch,
    UpdatedRow, WritePlan,
};
