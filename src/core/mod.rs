//! Core anonymization pipeline
//!
//! # Modules
//!
//! - [`compiler`] - binds table rules to the live schema before any read
//! - [`stream`] - bounded, prefetching row stream
//! - [`engine`] - applies compiled rules to a batch
//! - [`writer`] - transactional batch writes with retry
//! - [`orchestrator`] - sequences tables and aggregates results
//! - [`summary`] - per-table results, run summary, exit codes
//! - [`dump`] - optional `pg_dump` after the run
//!
//! # Example
//!
//! ```rust,no_run
//! use pgmask::adapters::database::create_database_client;
//! use pgmask::config::{load_anonymization_spec, load_config};
//! use pgmask::core::orchestrator::{Orchestrator, RunOptions};
//! use pgmask::providers::ProviderRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("pgmask.toml")?;
//! let spec = load_anonymization_spec("anonymize.yml")?;
//! let client = create_database_client(&config).await?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let orchestrator = Orchestrator::new(
//!     client,
//!     ProviderRegistry::builtin(),
//!     RunOptions::from_config(&config),
//!     shutdown_rx,
//! );
//!
//! let summary = orchestrator.run(&spec).await?;
//! println!("Rows updated: {}", summary.total_rows_updated());
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod dump;
pub mod engine;
pub mod orchestrator;
pub mod stream;
pub mod summary;
pub mod writer;
