//! PostgreSQL client implementation
//!
//! Pooled sessions for catalog lookups, streaming reads and batch updates.
//! Every stream and every batch write checks out its own session, so a
//! table's cursor stays open while its earlier batches are being written.

use crate::adapters::postgresql::sql;
use crate::config::schema::{ExecutionConfig, PostgreSQLConfig};
use crate::config::secret::redact_connection_string;
use crate::core::stream::{BatchAssembler, BatchSender, RowStream};
use crate::domain::errors::{DatabaseError, PgMaskError};
use crate::domain::ids::TableName;
use crate::domain::row::{ColumnInfo, ReadPlan, Row, TableSchema, TransformedBatch, WritePlan};
use crate::domain::Result;
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use postgres_native_tls::MakeTlsConnector;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;

/// SQLSTATEs worth retrying: serialization failure, deadlock, statement
/// timeout, admin shutdown, lock not available, too many connections
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "57014", "57P01", "55P03", "53300"];

/// Read-ahead and read timeout for row streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub prefetch_batches: usize,
    pub read_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            prefetch_batches: 2,
            read_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&ExecutionConfig> for StreamSettings {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            prefetch_batches: config.prefetch_batches,
            read_timeout: Duration::from_secs(config.read_timeout_seconds),
        }
    }
}

/// PostgreSQL client for pgmask
pub struct PostgreSQLClient {
    /// Connection pool
    pool: Pool,

    /// Configuration
    config: PostgreSQLConfig,

    /// Database named by the connection string
    database: String,

    settings: StreamSettings,
}

impl PostgreSQLClient {
    /// Create a new PostgreSQL client
    ///
    /// The pool is lazy: no session is opened until the first checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string cannot be parsed or the TLS
    /// connector or pool cannot be built.
    pub async fn new(config: PostgreSQLConfig, settings: StreamSettings) -> Result<Self> {
        let mut pg_config: tokio_postgres::Config = config
            .connection_string
            .expose_secret()
            .as_ref()
            .parse()
            .map_err(|e| {
                PgMaskError::Configuration(format!("Invalid PostgreSQL connection string: {e}"))
            })?;

        pg_config.ssl_mode(match config.ssl_mode.as_str() {
            "disable" => SslMode::Disable,
            "prefer" => SslMode::Prefer,
            _ => SslMode::Require,
        });

        let database = pg_config
            .get_dbname()
            .or_else(|| pg_config.get_user())
            .unwrap_or("postgres")
            .to_string();

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = match make_tls_connector(&config.ssl_mode)? {
            Some(tls) => Manager::from_config(pg_config, tls, manager_config),
            None => Manager::from_config(pg_config, NoTls, manager_config),
        };

        let timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| {
                DatabaseError::ConnectionFailed(format!("Failed to create connection pool: {e}"))
            })?;

        let client = Self {
            pool,
            config,
            database,
            settings,
        };
        tracing::debug!(
            connection = %client.connection_string_safe(),
            ssl_mode = %client.config.ssl_mode,
            max_connections = client.config.max_connections,
            "PostgreSQL pool configured"
        );
        Ok(client)
    }

    /// Test the connection to PostgreSQL
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;

        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| query_error("Connection test", &e))?;

        tracing::info!(database = %self.database, "PostgreSQL connection test successful");
        Ok(())
    }

    /// Get a session from the pool with the configured statement timeout applied
    ///
    /// # Errors
    ///
    /// Returns an error if no session becomes available in time.
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Object> {
        let client = self.pool.get().await.map_err(pool_error)?;

        if self.config.statement_timeout_seconds > 0 {
            let set_timeout = format!(
                "SET statement_timeout = {}",
                self.config.statement_timeout_seconds * 1000
            );
            client
                .batch_execute(&set_timeout)
                .await
                .map_err(|e| query_error("Setting statement timeout", &e))?;
        }

        Ok(client)
    }

    /// Columns and primary key of `table` from the catalog
    pub async fn table_schema(&self, table: &TableName) -> Result<TableSchema> {
        let client = self.get_connection().await?;
        let params: [&(dyn ToSql + Sync); 2] = [&table.schema(), &table.name()];

        let column_rows = client
            .query(sql::COLUMNS_QUERY, &params)
            .await
            .map_err(|e| query_error("Column lookup", &e))?;
        if column_rows.is_empty() {
            return Err(PgMaskError::SchemaMismatch {
                table: table.to_string(),
                message: "table does not exist".to_string(),
            });
        }

        let mut columns = Vec::with_capacity(column_rows.len());
        for row in &column_rows {
            let name: String = row.try_get(0).map_err(|e| query_error("Column lookup", &e))?;
            let data_type: String =
                row.try_get(1).map_err(|e| query_error("Column lookup", &e))?;
            columns.push(ColumnInfo::new(name, data_type));
        }

        let primary_key = client
            .query(sql::PRIMARY_KEY_QUERY, &params)
            .await
            .map_err(|e| query_error("Primary key lookup", &e))?
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| query_error("Primary key lookup", &e))?;

        Ok(TableSchema {
            table: table.clone(),
            columns,
            primary_key,
        })
    }

    /// Start a reader task over `plan` and return its stream
    ///
    /// The session is checked out before the task starts so pool errors are
    /// reported here rather than as the first stream item.
    pub async fn open_stream(&self, plan: ReadPlan) -> Result<RowStream> {
        let client = self.get_connection().await?;
        let (sender, stream) = RowStream::channel(self.settings.prefetch_batches);
        let read_timeout = self.settings.read_timeout;

        tokio::spawn(async move {
            if let Err(e) = stream_rows(client, &plan, read_timeout, &sender).await {
                tracing::debug!(table = %plan.table, error = %e, "Row stream failed");
                let _ = sender.send(Err(e)).await;
            }
        });

        Ok(stream)
    }

    /// Apply one batch with a single set-based UPDATE in its own transaction
    pub async fn write_batch(
        &self,
        plan: &WritePlan,
        batch: &TransformedBatch,
        commit: bool,
    ) -> Result<u64> {
        if batch.rows.is_empty() || plan.target_columns.is_empty() {
            return Ok(0);
        }

        let statement = sql::update_rows(plan);
        let params = sql::update_parameters(plan, batch);
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|column| column as &(dyn ToSql + Sync))
            .collect();

        let mut client = self.get_connection().await?;
        let transaction = client
            .transaction()
            .await
            .map_err(|e| transaction_error("BEGIN", &e))?;

        let updated = transaction
            .execute(statement.as_str(), &param_refs)
            .await
            .map_err(|e| query_error("Batch update", &e))?;

        if commit {
            transaction
                .commit()
                .await
                .map_err(|e| transaction_error("COMMIT", &e))?;
        } else {
            transaction
                .rollback()
                .await
                .map_err(|e| transaction_error("ROLLBACK", &e))?;
        }

        Ok(updated)
    }

    /// Truncate all `tables` in one statement
    pub async fn truncate_tables(&self, tables: &[TableName], cascade: bool) -> Result<()> {
        if tables.is_empty() {
            return Ok(());
        }
        self.batch_execute(&sql::truncate_tables(tables, cascade))
            .await
    }

    /// Execute one or more unparameterized statements
    pub async fn batch_execute(&self, statements: &str) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .batch_execute(statements)
            .await
            .map_err(|e| query_error("Statement execution", &e))?;
        Ok(())
    }

    /// Name of the connected database
    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Get the connection string with the password redacted
    pub fn connection_string_safe(&self) -> String {
        redact_connection_string(self.config.connection_string.expose_secret().as_ref())
    }
}

/// Reader task body: one REPEATABLE READ, READ ONLY transaction with a portal
/// fetched `batch_size` rows at a time
async fn stream_rows(
    mut client: deadpool_postgres::Object,
    plan: &ReadPlan,
    read_timeout: Duration,
    sender: &BatchSender,
) -> Result<()> {
    let transaction = client
        .transaction()
        .await
        .map_err(|e| transaction_error("BEGIN", &e))?;
    transaction
        .batch_execute("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .await
        .map_err(|e| transaction_error("SET TRANSACTION", &e))?;

    let query = sql::select_rows(plan);
    let portal = transaction
        .bind(query.as_str(), &[])
        .await
        .map_err(|e| query_error("Opening cursor", &e))?;

    let max_rows = i32::try_from(plan.batch_size).unwrap_or(i32::MAX);
    let mut assembler = BatchAssembler::new();

    loop {
        let rows = tokio::time::timeout(read_timeout, transaction.query_portal(&portal, max_rows))
            .await
            .map_err(|_| {
                DatabaseError::Timeout(format!(
                    "reading {} after {} rows",
                    plan.table,
                    assembler.rows_emitted()
                ))
            })?
            .map_err(|e| query_error("Fetching rows", &e))?;

        if rows.is_empty() {
            break;
        }
        let last = rows.len() < plan.batch_size;

        let decoded = rows
            .iter()
            .map(|row| decode_row(row, plan))
            .collect::<Result<Vec<_>>>()?;

        if sender.send(Ok(assembler.assemble(decoded))).await.is_err() {
            // Consumer went away (failure or cancellation); the transaction
            // is rolled back on drop.
            return Ok(());
        }
        if last {
            break;
        }
    }

    transaction
        .commit()
        .await
        .map_err(|e| transaction_error("COMMIT", &e))?;
    tracing::trace!(table = %plan.table, rows = assembler.rows_emitted(), "Row stream exhausted");
    Ok(())
}

fn decode_row(row: &tokio_postgres::Row, plan: &ReadPlan) -> Result<Row> {
    let keys = plan.key_columns.len();

    let mut key = Vec::with_capacity(keys);
    for index in 0..keys {
        let text: Option<String> = row
            .try_get(index)
            .map_err(|e| query_error("Decoding key", &e))?;
        key.push(text.unwrap_or_default());
    }

    let mut values = Vec::with_capacity(plan.columns.len());
    for (offset, column) in plan.columns.iter().enumerate() {
        let text: Option<String> = row
            .try_get(keys + offset)
            .map_err(|e| query_error("Decoding value", &e))?;
        values.push(sql::decode_value(column, text)?);
    }

    Ok(Row { key, values })
}

fn make_tls_connector(ssl_mode: &str) -> Result<Option<MakeTlsConnector>> {
    let mut builder = native_tls::TlsConnector::builder();
    match ssl_mode {
        "disable" => return Ok(None),
        "prefer" | "require" => {
            builder.danger_accept_invalid_certs(true);
        }
        "verify-ca" => {
            builder.danger_accept_invalid_hostnames(true);
        }
        _ => {}
    }

    let connector = builder
        .build()
        .map_err(|e| PgMaskError::Configuration(format!("Failed to build TLS connector: {e}")))?;
    Ok(Some(MakeTlsConnector::new(connector)))
}

fn pool_error(err: PoolError) -> PgMaskError {
    match err {
        PoolError::Timeout(kind) => {
            DatabaseError::PoolExhausted(format!("timed out waiting for a session ({kind:?})"))
        }
        PoolError::Backend(e) => DatabaseError::ConnectionFailed(e.to_string()),
        other => DatabaseError::ConnectionFailed(other.to_string()),
    }
    .into()
}

fn query_error(context: &str, err: &tokio_postgres::Error) -> PgMaskError {
    DatabaseError::QueryFailed {
        message: format!("{context} failed: {}", describe(err)),
        transient: is_transient(err),
    }
    .into()
}

fn transaction_error(context: &str, err: &tokio_postgres::Error) -> PgMaskError {
    DatabaseError::TransactionFailed {
        message: format!("{context} failed: {}", describe(err)),
        transient: is_transient(err),
    }
    .into()
}

/// Server message when there is one, the client error otherwise
fn describe(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{} (SQLSTATE {})", db.message(), db.code().code()),
        None => err.to_string(),
    }
}

fn is_transient(err: &tokio_postgres::Error) -> bool {
    if err.is_closed() {
        return true;
    }
    if let Some(state) = err.code() {
        let code = state.code();
        return code.starts_with("08") || TRANSIENT_SQLSTATES.contains(&code);
    }
    std::error::Error::source(err).is_some_and(|source| source.is::<std::io::Error>())
}
