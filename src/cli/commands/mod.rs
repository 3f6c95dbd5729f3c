//! CLI command implementations

pub mod anonymize;
pub mod providers;
pub mod validate;
