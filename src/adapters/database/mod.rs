//! Database abstraction layer
//!
//! Trait-based abstraction over the target database so the pipeline can be
//! driven against PostgreSQL or an in-memory double.

pub mod factory;
pub mod traits;

pub use factory::create_database_client;
pub use traits::DatabaseClient;
