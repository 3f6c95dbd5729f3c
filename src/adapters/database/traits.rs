//! Database abstraction traits
//!
//! [`DatabaseClient`] is the seam between the anonymization pipeline and the
//! database. The PostgreSQL adapter implements it for real runs; tests drive
//! the pipeline through an in-memory implementation.

use crate::core::stream::RowStream;
use crate::domain::ids::TableName;
use crate::domain::row::{ReadPlan, TableSchema, TransformedBatch, WritePlan};
use crate::domain::Result;
use async_trait::async_trait;

/// Database operations needed to anonymize tables in place
///
/// Implementations must give every stream and every batch write its own
/// session: a stream keeps its cursor open while batches of the same table
/// are written.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Name of the connected database, for logs and reports
    fn database_name(&self) -> &str;

    /// Test the database connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Live column list and primary key of a table
    ///
    /// # Errors
    ///
    /// Returns [`PgMaskError::SchemaMismatch`](crate::domain::PgMaskError::SchemaMismatch)
    /// if the table does not exist.
    async fn table_schema(&self, table: &TableName) -> Result<TableSchema>;

    /// Open a streaming read over `plan.table`
    ///
    /// Batches hold at most `plan.batch_size` rows. Row order is whatever the
    /// storage yields.
    async fn open_stream(&self, plan: ReadPlan) -> Result<RowStream>;

    /// Write one transformed batch inside a single transaction
    ///
    /// With `commit = false` the transaction is rolled back after the update
    /// (dry run). Returns the number of rows the update touched.
    ///
    /// # Errors
    ///
    /// Database errors carry their transience so the caller can retry.
    async fn write_batch(
        &self,
        plan: &WritePlan,
        batch: &TransformedBatch,
        commit: bool,
    ) -> Result<u64>;

    /// Empty the given tables in one statement
    async fn truncate_tables(&self, tables: &[TableName], cascade: bool) -> Result<()>;

    /// Execute raw SQL (one or more statements, no parameters)
    async fn execute_batch(&self, sql: &str) -> Result<()>;
}
