// pgmask - In-place PostgreSQL Anonymization Tool
// Copyright (c) 2025 pgmask Contributors
// Licensed under the MIT License

//! # pgmask - In-place PostgreSQL Anonymization
//!
//! pgmask rewrites sensitive columns of a live PostgreSQL database according to
//! a declarative YAML schema that maps columns to anonymization strategies.
//! Typical use is producing a shareable copy of a production database for
//! staging, QA or analytics.
//!
//! ## Overview
//!
//! For every configured table pgmask:
//! - **Compiles** the rules against the live schema (unknown columns, bad
//!   parameters and primary-key targets fail before any row is read)
//! - **Streams** rows in primary-key batches from a consistent snapshot
//! - **Transforms** each batch through the configured providers
//! - **Writes** the batch back in its own transaction, retrying transient errors
//!
//! Tables listed for truncation are emptied in a single statement before
//! anything else runs.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Pipeline (compiler, stream, engine, writer, orchestrator)
//! - [`providers`] - Anonymization strategies and their registry
//! - [`adapters`] - Database abstraction and the PostgreSQL backend
//! - [`domain`] - Identifiers, rows, plans and errors
//! - [`config`] - Application config and anonymization schema
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pgmask::adapters::database::create_database_client;
//! use pgmask::config::{load_anonymization_spec, load_config};
//! use pgmask::core::orchestrator::{Orchestrator, RunOptions};
//! use pgmask::providers::ProviderRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("pgmask.toml")?;
//!     let spec = load_anonymization_spec("anonymize.yml")?;
//!     let client = create_database_client(&config).await?;
//!
//!     let (_tx, shutdown) = tokio::sync::watch::channel(false);
//!     let orchestrator = Orchestrator::new(
//!         client,
//!         ProviderRegistry::builtin(),
//!         RunOptions::from_config(&config),
//!         shutdown,
//!     );
//!
//!     let summary = orchestrator.run(&spec).await?;
//!     println!("Updated {} rows", summary.total_rows_updated());
//!     Ok(())
//! }
//! ```
//!
//! ## Anonymization Schema
//!
//! ```yaml
//! tables:
//!   - table: public.users
//!     primary_key: [id]
//!     batch_size: 500
//!     columns:
//!       - column: email
//!         provider: { name: fake.email, seed: 42 }
//!       - column: phone
//!         provider: { name: partial_mask, unmasked_right: 2 }
//!       - column: preferences.theme
//!         provider: { name: set, value: light }
//!   - table: public.sessions
//!     truncate: true
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`domain::Result`], whose error type
//! [`domain::PgMaskError`] maps onto the process exit codes in
//! [`core::summary::exit_code`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod providers;
