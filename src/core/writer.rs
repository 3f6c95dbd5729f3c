//! Batch writer
//!
//! Writes one transformed batch per transaction, retrying transient failures
//! with exponential backoff. Every attempt is bounded by the write timeout; a
//! timed-out attempt counts as transient.

use crate::adapters::database::DatabaseClient;
use crate::config::schema::RetryConfig;
use crate::domain::errors::{BatchErrorDetail, DatabaseError, PgMaskError};
use crate::domain::row::{TransformedBatch, WritePlan};
use crate::domain::Result;
use crate::log_retry_attempt;
use std::sync::Arc;
use std::time::Duration;

/// Result of a successful batch write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Rows the update statement touched
    pub rows_updated: u64,

    /// Attempts made, including the first
    pub attempts: usize,
}

/// Writes batches for any number of tables
#[derive(Clone)]
pub struct BatchWriter {
    client: Arc<dyn DatabaseClient>,
    retry: RetryConfig,
    write_timeout: Duration,
    commit: bool,
}

impl BatchWriter {
    /// `commit = false` rolls every batch transaction back (dry run)
    pub fn new(
        client: Arc<dyn DatabaseClient>,
        retry: RetryConfig,
        write_timeout: Duration,
        commit: bool,
    ) -> Self {
        Self {
            client,
            retry,
            write_timeout,
            commit,
        }
    }

    /// Write `batch`, retrying transient failures up to `max_retries` times
    ///
    /// # Errors
    ///
    /// [`PgMaskError::BatchWrite`] once retries are exhausted or on the first
    /// non-transient failure.
    pub async fn write(&self, plan: &WritePlan, batch: &TransformedBatch) -> Result<WriteOutcome> {
        let max_attempts = self.retry.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(plan, batch).await {
                Ok(rows_updated) => {
                    return Ok(WriteOutcome {
                        rows_updated,
                        attempts: attempt,
                    })
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    log_retry_attempt!(
                        plan.table,
                        batch.batch_index,
                        attempt,
                        max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(PgMaskError::BatchWrite(BatchErrorDetail {
                        table: plan.table.to_string(),
                        batch_index: batch.batch_index,
                        batch_offset: batch.offset,
                        attempts: attempt,
                        primary_keys: batch.primary_keys(),
                        message: e.to_string(),
                    }))
                }
            }
        }
    }

    async fn attempt(&self, plan: &WritePlan, batch: &TransformedBatch) -> Result<u64> {
        match tokio::time::timeout(
            self.write_timeout,
            self.client.write_batch(plan, batch, self.commit),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::Timeout(format!(
                "writing batch {} of {} after {:?}",
                batch.batch_index, plan.table, self.write_timeout
            ))
            .into()),
        }
    }
}
