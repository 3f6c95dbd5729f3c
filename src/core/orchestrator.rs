//! Orchestrator - drives a whole anonymization run
//!
//! Phases: resolve providers (nothing is touched if this fails), run the init
//! SQL, truncate, then run the table pipelines with at most
//! `parallel_tables` in flight. Results come back in declared table order.
//!
//! Each table pipeline moves through
//! `PENDING → COMPILING → STREAMING → DONE | FAILED`. Batches of a table are
//! written one after the other; the reader prefetches on its own session.

use crate::adapters::database::DatabaseClient;
use crate::config::schema::{
    ApplicationConfig, ExecutionConfig, FailurePolicy, PgMaskConfig, RetryConfig,
};
use crate::config::spec::{AnonymizationSpec, TableSpec};
use crate::core::compiler::{compile, CompiledTable};
use crate::core::engine::TransformEngine;
use crate::core::summary::{BatchCheckpoint, ExecutionResult, RunSummary, TableState};
use crate::core::writer::BatchWriter;
use crate::domain::errors::PgMaskError;
use crate::domain::Result;
use crate::providers::{ProviderRegistry, ProviderSet};
use crate::{log_batch_committed, log_table_start};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Knobs of a run, usually taken from [`PgMaskConfig`]
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub batch_size: usize,
    pub parallel_tables: usize,
    pub failure_policy: FailurePolicy,
    pub stop_on_first_error: bool,
    pub truncate_cascade: bool,
    pub write_timeout: Duration,
    pub retry: RetryConfig,
    pub init_sql: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_sections(&ApplicationConfig::default(), &ExecutionConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &PgMaskConfig) -> Self {
        Self::from_sections(&config.application, &config.execution)
    }

    fn from_sections(application: &ApplicationConfig, execution: &ExecutionConfig) -> Self {
        Self {
            dry_run: application.dry_run,
            batch_size: execution.batch_size,
            parallel_tables: execution.parallel_tables,
            failure_policy: execution.failure_policy,
            stop_on_first_error: execution.stop_on_first_error,
            truncate_cascade: execution.truncate_cascade,
            write_timeout: Duration::from_secs(execution.write_timeout_seconds),
            retry: execution.retry.clone(),
            init_sql: application.init_sql.clone(),
        }
    }
}

/// Anonymization orchestrator
pub struct Orchestrator {
    client: Arc<dyn DatabaseClient>,
    registry: ProviderRegistry,
    options: RunOptions,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    /// `shutdown` flips to `true` when the run must stop
    pub fn new(
        client: Arc<dyn DatabaseClient>,
        registry: ProviderRegistry,
        options: RunOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            registry,
            options,
            shutdown,
        }
    }

    /// Execute a run over `spec`
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that stop the whole run before the
    /// table pipelines: provider resolution, init SQL and truncation. Table
    /// failures are reported in the summary.
    pub async fn run(&self, spec: &AnonymizationSpec) -> Result<RunSummary> {
        let started = Instant::now();
        spec.validate()?;
        let providers = ProviderSet::resolve_all(&self.registry, spec)?;

        tracing::info!(
            database = %self.client.database_name(),
            tables = spec.tables.len(),
            providers = providers.len(),
            parallel_tables = self.options.parallel_tables,
            dry_run = self.options.dry_run,
            "Starting anonymization"
        );

        let mut summary = RunSummary {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        if self.is_cancelled() {
            return Err(PgMaskError::Cancelled("shutdown requested before start".into()));
        }

        if let Some(sql) = self.options.init_sql.as_deref().filter(|s| !s.trim().is_empty()) {
            if self.options.dry_run {
                tracing::info!("DRY RUN: skipping init SQL");
            } else {
                tracing::info!("Executing init SQL");
                self.client.execute_batch(sql).await?;
            }
        }

        let truncate = spec.tables_to_truncate();
        if !truncate.is_empty() {
            if self.options.dry_run {
                tracing::info!(tables = truncate.len(), "DRY RUN: skipping truncation");
            } else {
                tracing::info!(
                    tables = ?truncate.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    cascade = self.options.truncate_cascade,
                    "Truncating tables"
                );
                self.client
                    .truncate_tables(&truncate, self.options.truncate_cascade)
                    .await?;
            }
            summary.truncated = truncate;
        }

        let providers = Arc::new(providers);
        let writer = BatchWriter::new(
            Arc::clone(&self.client),
            self.options.retry.clone(),
            self.options.write_timeout,
            !self.options.dry_run,
        );
        let abort = Arc::new(AtomicBool::new(false));

        summary.results = stream::iter(spec.tables.iter())
            .map(|table| {
                let pipeline = TablePipeline {
                    client: Arc::clone(&self.client),
                    providers: Arc::clone(&providers),
                    writer: writer.clone(),
                    options: &self.options,
                    shutdown: self.shutdown.clone(),
                    abort: Arc::clone(&abort),
                };
                async move { pipeline.run(table).await }
            })
            .buffered(self.options.parallel_tables.max(1))
            .collect()
            .await;

        summary.interrupted = self.is_cancelled();
        summary.duration = started.elapsed();
        Ok(summary)
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Everything one table pipeline needs
struct TablePipeline<'a> {
    client: Arc<dyn DatabaseClient>,
    providers: Arc<ProviderSet>,
    writer: BatchWriter,
    options: &'a RunOptions,
    shutdown: watch::Receiver<bool>,

    /// Set once a failure ends the run; checked before every batch
    abort: Arc<AtomicBool>,
}

impl TablePipeline<'_> {
    async fn run(mut self, spec: &TableSpec) -> ExecutionResult {
        let started = Instant::now();
        let mut result = ExecutionResult::new(spec.table.clone());

        if spec.truncate {
            result.truncated = true;
            result.transition(TableState::Done);
            return result;
        }

        if let Some(error) = self.interruption() {
            result.fail(error);
            return result;
        }

        result.transition(TableState::Compiling);
        let compiled = match self.compile(spec).await {
            Ok(compiled) => compiled,
            Err(e) => {
                tracing::error!(table = %spec.table, error = %e, "Table compilation failed");
                self.record_failure(&mut result, e);
                result.duration = started.elapsed();
                return result;
            }
        };

        result.transition(TableState::Streaming);
        log_table_start!(
            compiled.table,
            compiled.rules.len(),
            compiled.read.batch_size
        );

        if let Err(e) = self.stream(&compiled, &mut result).await {
            tracing::error!(
                table = %spec.table,
                batches_committed = result.batches_committed,
                error = %e,
                "Table anonymization failed"
            );
            self.record_failure(&mut result, e);
        } else {
            result.transition(TableState::Done);
            tracing::info!(
                table = %spec.table,
                rows_read = result.rows_read,
                rows_updated = result.rows_updated,
                rows_skipped = result.rows_skipped,
                "Table anonymized"
            );
        }

        result.duration = started.elapsed();
        result
    }

    async fn compile(&self, spec: &TableSpec) -> Result<CompiledTable> {
        let schema = self.client.table_schema(&spec.table).await?;
        compile(spec, &schema, &self.providers, self.options.batch_size)
    }

    async fn stream(&mut self, table: &CompiledTable, result: &mut ExecutionResult) -> Result<()> {
        let engine = TransformEngine::new(table, self.options.failure_policy);
        let mut rows = self.client.open_stream(table.read.clone()).await?;

        loop {
            if let Some(error) = self.interruption() {
                return Err(error);
            }

            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    return Err(PgMaskError::Cancelled("shutdown requested".into()));
                }
                next = rows.next_batch() => next,
            };
            let Some(batch) = next else {
                return Ok(());
            };
            let batch = batch?;
            result.rows_read += batch.len() as u64;

            let transformed = engine.transform(batch)?;
            result.rows_skipped += transformed.skipped() as u64;
            result.row_failures.extend(transformed.failures.iter().cloned());
            if transformed.rows.is_empty() {
                continue;
            }

            let outcome = self.writer.write(&table.write, &transformed).await?;
            result.rows_updated += outcome.rows_updated;
            result.batches_committed += 1;
            result.checkpoint = Some(BatchCheckpoint {
                batch_index: transformed.batch_index,
                rows_committed: result.rows_updated,
                last_primary_keys: transformed.primary_keys(),
            });
            log_batch_committed!(
                table.table,
                transformed.batch_index,
                outcome.rows_updated,
                result.rows_updated
            );
        }
    }

    /// Cancellation, or a failure in another table that ended the run
    fn interruption(&self) -> Option<PgMaskError> {
        if *self.shutdown.borrow() {
            Some(PgMaskError::Cancelled("shutdown requested".into()))
        } else if self.abort.load(Ordering::SeqCst) {
            Some(PgMaskError::Aborted(
                "run stopped after another table failed".into(),
            ))
        } else {
            None
        }
    }

    fn record_failure(&self, result: &mut ExecutionResult, error: PgMaskError) {
        if self.ends_run(&error) {
            self.abort.store(true, Ordering::SeqCst);
        }
        result.fail(error);
    }

    /// A provider error under fail-fast always ends the run; any other table
    /// failure does so only with stop-on-first-error
    fn ends_run(&self, error: &PgMaskError) -> bool {
        match error {
            PgMaskError::Cancelled(_) | PgMaskError::Aborted(_) => false,
            PgMaskError::ProviderExecution(_) => {
                self.options.failure_policy == FailurePolicy::FailFast
                    || self.options.stop_on_first_error
            }
            _ => self.options.stop_on_first_error,
        }
    }
}

/// Resolves once the shutdown flag is raised; never if the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
