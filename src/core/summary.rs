//! Run report
//!
//! One [`ExecutionResult`] per table, aggregated into a [`RunSummary`] that the
//! CLI logs and turns into an exit code.

use crate::domain::errors::{DatabaseError, PgMaskError, RowErrorDetail};
use crate::domain::ids::TableName;
use std::fmt;
use std::time::Duration;

/// Exit codes of the `pgmask` binary
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const PARTIAL_FAILURE: i32 = 1;
    pub const CONFIGURATION: i32 = 2;
    pub const CONNECTION: i32 = 4;
    pub const FATAL: i32 = 5;
    pub const INTERRUPTED: i32 = 130;
}

/// Exit code for an error that ended the run before or outside the tables
pub fn exit_code_for(error: &PgMaskError) -> i32 {
    match error {
        e if e.is_configuration() => exit_code::CONFIGURATION,
        PgMaskError::Database(DatabaseError::ConnectionFailed(_))
        | PgMaskError::Database(DatabaseError::PoolExhausted(_)) => exit_code::CONNECTION,
        PgMaskError::Cancelled(_) => exit_code::INTERRUPTED,
        _ => exit_code::FATAL,
    }
}

/// Per-table pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Pending,
    Compiling,
    Streaming,
    Done,
    Failed,
}

impl TableState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TableState::Done | TableState::Failed)
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableState::Pending => "PENDING",
            TableState::Compiling => "COMPILING",
            TableState::Streaming => "STREAMING",
            TableState::Done => "DONE",
            TableState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Last batch confirmed written for a table
///
/// With deterministic providers, rerunning the table reproduces the committed
/// values, so a failed table can simply be run again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCheckpoint {
    pub batch_index: usize,

    /// Rows written up to and including this batch
    pub rows_committed: u64,

    /// Primary keys of the rows in this batch
    pub last_primary_keys: Vec<Vec<String>>,
}

/// Outcome of one table
#[derive(Debug)]
pub struct ExecutionResult {
    pub table: TableName,
    pub state: TableState,
    pub rows_read: u64,
    pub rows_updated: u64,

    /// Rows excluded or left unchanged after a provider failure
    pub rows_skipped: u64,

    pub batches_committed: usize,
    pub checkpoint: Option<BatchCheckpoint>,

    /// Provider failures recorded under the skip-row policy
    pub row_failures: Vec<RowErrorDetail>,

    pub error: Option<PgMaskError>,

    /// Table was emptied instead of anonymized
    pub truncated: bool,

    pub duration: Duration,
}

impl ExecutionResult {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            state: TableState::Pending,
            rows_read: 0,
            rows_updated: 0,
            rows_skipped: 0,
            batches_committed: 0,
            checkpoint: None,
            row_failures: Vec::new(),
            error: None,
            truncated: false,
            duration: Duration::ZERO,
        }
    }

    /// Move to `next`, logging the transition
    pub fn transition(&mut self, next: TableState) {
        tracing::debug!(table = %self.table, from = %self.state, to = %next, "Table state");
        self.state = next;
    }

    /// Terminal failure with its cause
    pub fn fail(&mut self, error: PgMaskError) {
        self.transition(TableState::Failed);
        self.error = Some(error);
    }

    pub fn is_done(&self) -> bool {
        self.state == TableState::Done
    }

    /// Failed after at least one batch was committed
    pub fn is_partial(&self) -> bool {
        self.state == TableState::Failed && self.batches_committed > 0
    }

    pub fn was_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(PgMaskError::is_cancellation)
    }
}

/// Aggregate of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Results in declared table order
    pub results: Vec<ExecutionResult>,

    /// Tables emptied before anonymization
    pub truncated: Vec<TableName>,

    pub duration: Duration,

    /// A shutdown signal arrived during the run
    pub interrupted: bool,

    /// Batch transactions were rolled back instead of committed
    pub dry_run: bool,
}

impl RunSummary {
    pub fn total_rows_read(&self) -> u64 {
        self.results.iter().map(|r| r.rows_read).sum()
    }

    pub fn total_rows_updated(&self) -> u64 {
        self.results.iter().map(|r| r.rows_updated).sum()
    }

    pub fn total_rows_skipped(&self) -> u64 {
        self.results.iter().map(|r| r.rows_skipped).sum()
    }

    pub fn failed_tables(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| r.state == TableState::Failed)
    }

    /// Every table reached DONE
    pub fn is_successful(&self) -> bool {
        !self.interrupted && self.results.iter().all(ExecutionResult::is_done)
    }

    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            exit_code::INTERRUPTED
        } else if self.is_successful() {
            exit_code::SUCCESS
        } else {
            exit_code::PARTIAL_FAILURE
        }
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            tables = self.results.len(),
            failed = self.failed_tables().count(),
            truncated = self.truncated.len(),
            rows_read = self.total_rows_read(),
            rows_updated = self.total_rows_updated(),
            rows_skipped = self.total_rows_skipped(),
            duration_secs = self.duration.as_secs_f64(),
            dry_run = self.dry_run,
            interrupted = self.interrupted,
            "Anonymization completed"
        );

        for result in &self.results {
            match &result.error {
                None => tracing::info!(
                    table = %result.table,
                    state = %result.state,
                    rows_read = result.rows_read,
                    rows_updated = result.rows_updated,
                    rows_skipped = result.rows_skipped,
                    truncated = result.truncated,
                    "Table result"
                ),
                Some(error) => tracing::warn!(
                    table = %result.table,
                    state = %result.state,
                    rows_read = result.rows_read,
                    rows_updated = result.rows_updated,
                    batches_committed = result.batches_committed,
                    last_batch = ?result.checkpoint.as_ref().map(|c| c.batch_index),
                    error = %error,
                    "Table result"
                ),
            }
            for failure in &result.row_failures {
                tracing::warn!(
                    table = %failure.table,
                    column = %failure.column,
                    batch = failure.batch_index,
                    key = ?failure.primary_key,
                    error = %failure.message,
                    "Row left unchanged"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, state: TableState) -> ExecutionResult {
        let mut result = ExecutionResult::new(name.parse().unwrap());
        result.state = state;
        result.rows_read = 10;
        result.rows_updated = 8;
        result.rows_skipped = 2;
        result
    }

    #[test]
    fn test_exit_codes() {
        let ok = RunSummary {
            results: vec![result("a", TableState::Done), result("b", TableState::Done)],
            ..Default::default()
        };
        assert!(ok.is_successful());
        assert_eq!(ok.exit_code(), exit_code::SUCCESS);
        assert_eq!(ok.total_rows_updated(), 16);
        assert_eq!(ok.total_rows_skipped(), 4);

        let partial = RunSummary {
            results: vec![result("a", TableState::Done), result("b", TableState::Failed)],
            ..Default::default()
        };
        assert_eq!(partial.exit_code(), exit_code::PARTIAL_FAILURE);
        assert_eq!(partial.failed_tables().count(), 1);

        let interrupted = RunSummary {
            interrupted: true,
            ..partial
        };
        assert_eq!(interrupted.exit_code(), exit_code::INTERRUPTED);
    }

    #[test]
    fn test_exit_code_for_errors() {
        assert_eq!(
            exit_code_for(&PgMaskError::UnknownStrategy("nope".into())),
            exit_code::CONFIGURATION
        );
        assert_eq!(
            exit_code_for(&DatabaseError::ConnectionFailed("refused".into()).into()),
            exit_code::CONNECTION
        );
        assert_eq!(
            exit_code_for(&PgMaskError::Io("disk full".into())),
            exit_code::FATAL
        );
    }

    #[test]
    fn test_partial_failure() {
        let mut r = result("users", TableState::Streaming);
        r.batches_committed = 3;
        r.fail(PgMaskError::Cancelled("SIGINT".into()));
        assert!(r.is_partial());
        assert!(r.was_cancelled());
        assert!(r.state.is_terminal());
    }
}
