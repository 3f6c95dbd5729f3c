//! Logging and observability
//!
//! Structured logging through `tracing`:
//! - console output for operators
//! - optional JSON log files with rotation
//! - `RUST_LOG` overrides the configured level
//!
//! Column values are never logged, original or anonymized. Log lines carry
//! table names, batch indexes, counts and primary keys only.
//!
//! # Example
//!
//! ```no_run
//! use pgmask::logging::init_logging;
//! use pgmask::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(table = "public.users", "Anonymizing");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a table pipeline
///
/// # Example
///
/// ```no_run
/// use pgmask::log_table_start;
///
/// log_table_start!("public.users", 3, 1000);
/// ```
#[macro_export]
macro_rules! log_table_start {
    ($table:expr, $rules:expr, $batch_size:expr) => {
        tracing::info!(
            table = %$table,
            rules = $rules,
            batch_size = $batch_size,
            "Anonymizing table"
        );
    };
}

/// Log a committed (or, in a dry run, rolled back) batch
///
/// # Example
///
/// ```no_run
/// use pgmask::log_batch_committed;
///
/// log_batch_committed!("public.users", 4, 1000, 4000);
/// ```
#[macro_export]
macro_rules! log_batch_committed {
    ($table:expr, $batch:expr, $rows:expr, $total:expr) => {
        tracing::debug!(
            table = %$table,
            batch = $batch,
            rows = $rows,
            rows_total = $total,
            "Batch written"
        );
    };
}

/// Log a retry of a batch write
///
/// # Example
///
/// ```no_run
/// use pgmask::log_retry_attempt;
/// use std::time::Duration;
///
/// log_retry_attempt!("public.users", 2, 1, 4, Duration::from_millis(200), "connection reset");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($table:expr, $batch:expr, $attempt:expr, $max_attempts:expr, $delay:expr, $reason:expr) => {
        tracing::warn!(
            table = %$table,
            batch = $batch,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay.as_millis() as u64,
            reason = %$reason,
            "Retrying batch write"
        );
    };
}
