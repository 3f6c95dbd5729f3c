//! Database client factory

use crate::adapters::database::traits::DatabaseClient;
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::{PostgreSQLClient, StreamSettings};
use crate::config::schema::PgMaskConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Create the database client for a run
///
/// Stream prefetch and read timeout come from the `[execution]` section.
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the pool cannot be built.
pub async fn create_database_client(config: &PgMaskConfig) -> Result<Arc<dyn DatabaseClient>> {
    let settings = StreamSettings::from(&config.execution);

    tracing::info!("Creating PostgreSQL client");
    let client = PostgreSQLClient::new(config.postgresql.clone(), settings).await?;
    let adapter = PostgreSQLAdapter::new(client);

    Ok(Arc::new(adapter) as Arc<dyn DatabaseClient>)
}
