//! Shared fixtures for integration tests
//!
//! [`MockDatabase`] keeps tables in memory and implements [`DatabaseClient`],
//! so the whole pipeline runs without a PostgreSQL server. Values cross the
//! boundary in the same text form the PostgreSQL adapter uses, so a value the
//! server would refuse to cast fails the write here too. Writes can be made
//! to fail on a given batch, and a shutdown can be triggered after N commits.

#![allow(dead_code)]

use async_trait::async_trait;
use pgmask::adapters::database::DatabaseClient;
use pgmask::adapters::postgresql::sql;
use pgmask::config::{parse_anonymization_spec, RetryConfig};
use pgmask::core::orchestrator::{Orchestrator, RunOptions};
use pgmask::core::stream::{BatchAssembler, RowStream};
use pgmask::core::summary::RunSummary;
use pgmask::domain::{
    value_as_text, ColumnInfo, DatabaseError, PgMaskError, ReadPlan, Result, Row, TableName,
    TableSchema, TransformedBatch, WritePlan,
};
use pgmask::providers::ProviderRegistry;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A table held by [`MockDatabase`]
#[derive(Debug, Clone)]
pub struct MockTable {
    pub schema: TableSchema,
    pub rows: Vec<Map<String, Value>>,
}

/// One successful `write_batch` call
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCall {
    pub table: String,
    pub batch_index: usize,
    pub rows: usize,
    pub commit: bool,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    remaining: usize,
    transient: bool,
}

#[derive(Default)]
struct MockState {
    tables: Vec<MockTable>,
    writes: Vec<WriteCall>,
    write_attempts: usize,
    truncations: Vec<(Vec<TableName>, bool)>,
    executed: Vec<String>,
    failures: HashMap<(String, usize), InjectedFailure>,
    cancel_after: Option<(usize, watch::Sender<bool>)>,
}

/// In-memory [`DatabaseClient`]
#[derive(Default)]
pub struct MockDatabase {
    state: Mutex<MockState>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table; `rows` are JSON objects keyed by column name
    pub fn with_table(
        self,
        name: &str,
        columns: &[(&str, &str)],
        primary_key: &[&str],
        rows: Vec<Value>,
    ) -> Self {
        let schema = TableSchema {
            table: TableName::new(name).unwrap(),
            columns: columns
                .iter()
                .map(|(name, data_type)| ColumnInfo::new(*name, *data_type))
                .collect(),
            primary_key: primary_key.iter().map(|k| k.to_string()).collect(),
        };
        let rows = rows
            .into_iter()
            .map(|row| match row {
                Value::Object(map) => map,
                other => panic!("row must be an object, got {other}"),
            })
            .collect();
        self.lock().tables.push(MockTable { schema, rows });
        self
    }

    /// Fail the write of `batch_index` on `table` `times` times in a row
    pub fn fail_write(&self, table: &str, batch_index: usize, times: usize, transient: bool) {
        self.lock().failures.insert(
            (qualified(table), batch_index),
            InjectedFailure {
                remaining: times,
                transient,
            },
        );
    }

    /// Raise the shutdown flag once `commits` batches have been written
    pub fn cancel_after(&self, commits: usize, sender: watch::Sender<bool>) {
        self.lock().cancel_after = Some((commits, sender));
    }

    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        let name = TableName::new(table).unwrap();
        self.lock()
            .tables
            .iter()
            .find(|t| t.schema.table == name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Values of one column in row order
    pub fn column(&self, table: &str, column: &str) -> Vec<Value> {
        self.rows(table)
            .into_iter()
            .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.lock().writes.clone()
    }

    pub fn write_attempts(&self) -> usize {
        self.lock().write_attempts
    }

    pub fn truncations(&self) -> Vec<(Vec<TableName>, bool)> {
        self.lock().truncations.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

fn qualified(table: &str) -> String {
    TableName::new(table).unwrap().to_string()
}

fn key_of(row: &Map<String, Value>, columns: &[ColumnInfo]) -> Vec<String> {
    columns
        .iter()
        .map(|c| {
            row.get(&c.name)
                .and_then(value_as_text)
                .map(|v| v.into_owned())
                .unwrap_or_default()
        })
        .collect()
}

fn missing(table: &TableName) -> PgMaskError {
    PgMaskError::SchemaMismatch {
        table: table.to_string(),
        message: "table does not exist".into(),
    }
}

#[async_trait]
impl DatabaseClient for MockDatabase {
    fn database_name(&self) -> &str {
        "mock"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn table_schema(&self, table: &TableName) -> Result<TableSchema> {
        self.lock()
            .tables
            .iter()
            .find(|t| &t.schema.table == table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| missing(table))
    }

    async fn open_stream(&self, plan: ReadPlan) -> Result<RowStream> {
        let rows: Vec<Row> = {
            let state = self.lock();
            let table = state
                .tables
                .iter()
                .find(|t| t.schema.table == plan.table)
                .ok_or_else(|| missing(&plan.table))?;
            table
                .rows
                .iter()
                .map(|row| {
                    let values = plan
                        .columns
                        .iter()
                        .map(|c| {
                            let stored = row.get(&c.name).unwrap_or(&Value::Null);
                            sql::decode_value(c, sql::encode_value(c, stored))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Row {
                        key: key_of(row, &plan.key_columns),
                        values,
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };

        let (sender, stream) = RowStream::channel(2);
        let batch_size = plan.batch_size.max(1);
        tokio::spawn(async move {
            let mut assembler = BatchAssembler::new();
            for chunk in rows.chunks(batch_size) {
                if sender.send(Ok(assembler.assemble(chunk.to_vec()))).await.is_err() {
                    break;
                }
            }
        });
        Ok(stream)
    }

    async fn write_batch(
        &self,
        plan: &WritePlan,
        batch: &TransformedBatch,
        commit: bool,
    ) -> Result<u64> {
        let mut state = self.lock();
        state.write_attempts += 1;

        let table_name = plan.table.to_string();
        if let Some(failure) = state.failures.get_mut(&(table_name.clone(), batch.batch_index)) {
            if failure.remaining > 0 {
                failure.remaining -= 1;
                return Err(PgMaskError::Database(DatabaseError::QueryFailed {
                    message: format!("injected failure on batch {}", batch.batch_index),
                    transient: failure.transient,
                }));
            }
        }

        let table = state
            .tables
            .iter_mut()
            .find(|t| t.schema.table == plan.table)
            .ok_or_else(|| missing(&plan.table))?;

        // Cast every parameter the way the server would before touching a row
        let keys = plan.key_columns.len();
        let params = sql::update_parameters(plan, batch);
        let mut decoded = Vec::with_capacity(batch.rows.len());
        for (index, row) in batch.rows.iter().enumerate() {
            let values = plan
                .target_columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    sql::decode_value(column, params[keys + i][index].clone()).map_err(|e| {
                        PgMaskError::Database(DatabaseError::QueryFailed {
                            message: format!("invalid input for {}: {e}", column.data_type),
                            transient: false,
                        })
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            decoded.push((row.key.clone(), values));
        }

        let mut updated = 0u64;
        for (key, values) in decoded {
            let Some(target) = table
                .rows
                .iter_mut()
                .find(|r| key_of(r, &plan.key_columns) == key)
            else {
                continue;
            };
            updated += 1;
            if commit {
                for (column, value) in plan.target_columns.iter().zip(values) {
                    target.insert(column.name.clone(), value);
                }
            }
        }

        state.writes.push(WriteCall {
            table: table_name,
            batch_index: batch.batch_index,
            rows: batch.rows.len(),
            commit,
        });

        let commits = state.writes.len();
        if let Some((after, sender)) = &state.cancel_after {
            if commits >= *after {
                let _ = sender.send(true);
            }
        }

        Ok(updated)
    }

    async fn truncate_tables(&self, tables: &[TableName], cascade: bool) -> Result<()> {
        let mut state = self.lock();
        for table in tables {
            if let Some(t) = state.tables.iter_mut().find(|t| &t.schema.table == table) {
                t.rows.clear();
            }
        }
        state.truncations.push((tables.to_vec(), cascade));
        Ok(())
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock().executed.push(sql.to_string());
        Ok(())
    }
}

/// Run options with a given batch size and millisecond retry delays
pub fn options(batch_size: usize) -> RunOptions {
    RunOptions {
        batch_size,
        retry: RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        },
        ..RunOptions::default()
    }
}

/// Parses `yaml` and runs it against `db` with no shutdown signal
pub async fn run(db: &Arc<MockDatabase>, yaml: &str, options: RunOptions) -> Result<RunSummary> {
    let (_tx, shutdown) = watch::channel(false);
    run_with_shutdown(db, yaml, options, shutdown).await
}

pub async fn run_with_shutdown(
    db: &Arc<MockDatabase>,
    yaml: &str,
    options: RunOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary> {
    let spec = parse_anonymization_spec(yaml)?;
    let client: Arc<dyn DatabaseClient> = db.clone();
    Orchestrator::new(client, ProviderRegistry::builtin(), options, shutdown)
        .run(&spec)
        .await
}

/// `count` users with id, email, name and a nullable phone (every third row NULL)
pub fn users(count: usize) -> MockDatabase {
    let rows = (1..=count)
        .map(|i| {
            let phone = if i % 3 == 0 {
                Value::Null
            } else {
                Value::String(format!("+1555000{i:04}"))
            };
            serde_json::json!({
                "id": i,
                "email": format!("user{i}@example.com"),
                "name": format!("User {i}"),
                "phone": phone,
            })
        })
        .collect();
    MockDatabase::new().with_table(
        "public.users",
        &[
            ("id", "integer"),
            ("email", "text"),
            ("name", "text"),
            ("phone", "text"),
        ],
        &["id"],
        rows,
    )
}
