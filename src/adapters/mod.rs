//! External system integrations for pgmask.
//!
//! - [`database`] - Database abstraction layer (trait-based)
//! - [`postgresql`] - PostgreSQL implementation on `deadpool-postgres`
//!
//! # Design Pattern
//!
//! The pipeline only talks to [`database::DatabaseClient`], so tests can drive
//! it with an in-memory implementation and the PostgreSQL specifics stay in
//! one place.
//!
//! ```rust,no_run
//! use pgmask::adapters::database::create_database_client;
//! use pgmask::config::load_config;
//! use pgmask::domain::TableName;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("pgmask.toml")?;
//! let client = create_database_client(&config).await?;
//! client.test_connection().await?;
//!
//! let schema = client.table_schema(&TableName::new("public.users")?).await?;
//! println!("{} columns", schema.columns.len());
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod postgresql;
