//! PostgreSQL adapter implementing the database trait

use crate::adapters::database::traits::DatabaseClient;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::core::stream::RowStream;
use crate::domain::ids::TableName;
use crate::domain::row::{ReadPlan, TableSchema, TransformedBatch, WritePlan};
use crate::domain::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// PostgreSQL implementation of [`DatabaseClient`]
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl DatabaseClient for PostgreSQLAdapter {
    fn database_name(&self) -> &str {
        self.client.database_name()
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn table_schema(&self, table: &TableName) -> Result<TableSchema> {
        self.client.table_schema(table).await
    }

    async fn open_stream(&self, plan: ReadPlan) -> Result<RowStream> {
        tracing::debug!(
            table = %plan.table,
            batch_size = plan.batch_size,
            filtered = plan.filter.is_some(),
            "Opening row stream"
        );
        self.client.open_stream(plan).await
    }

    async fn write_batch(
        &self,
        plan: &WritePlan,
        batch: &TransformedBatch,
        commit: bool,
    ) -> Result<u64> {
        let updated = self.client.write_batch(plan, batch, commit).await?;
        if !commit {
            tracing::debug!(
                table = %plan.table,
                batch = batch.batch_index,
                rows = updated,
                "DRY RUN: batch update rolled back"
            );
        }
        Ok(updated)
    }

    async fn truncate_tables(&self, tables: &[TableName], cascade: bool) -> Result<()> {
        self.client.truncate_tables(tables, cascade).await
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await
    }
}
