//! PostgreSQL database integration
//!
//! Catalog lookups, streaming reads and set-based batch updates against the
//! database being anonymized.

pub mod adapter;
pub mod client;
pub mod sql;

pub use adapter::PostgreSQLAdapter;
pub use client::{PostgreSQLClient, StreamSettings};
