//! Validate config command implementation
//!
//! Checks the application config and, when one is given, the anonymization
//! schema including provider parameters. Nothing connects to the database.

use crate::config::{load_anonymization_spec, load_config, redact_connection_string};
use crate::core::summary::exit_code;
use crate::providers::{ProviderRegistry, ProviderSet};
use clap::Args;
use secrecy::ExposeSecret;
use std::path::PathBuf;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Anonymization schema to check; defaults to application.schema_file
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!(
            "  PostgreSQL Connection: {}",
            redact_connection_string(config.postgresql.connection_string.expose_secret().as_ref())
        );
        println!("  SSL Mode: {}", config.postgresql.ssl_mode);
        println!("  Max Connections: {}", config.postgresql.max_connections);
        println!("  Batch Size: {}", config.execution.batch_size);
        println!("  Parallel Tables: {}", config.execution.parallel_tables);
        println!("  Failure Policy: {}", config.execution.failure_policy);
        println!();

        let schema = self
            .schema
            .as_ref()
            .map(|p| p.display().to_string())
            .or(config.application.schema_file);
        let Some(schema) = schema else {
            println!("ℹ️  No anonymization schema to check");
            return Ok(exit_code::SUCCESS);
        };

        let spec = match load_anonymization_spec(&schema) {
            Ok(spec) => spec,
            Err(e) => {
                println!("❌ Anonymization schema {schema} is invalid");
                println!("   Error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        match ProviderSet::resolve_all(&ProviderRegistry::builtin(), &spec) {
            Ok(providers) => {
                println!("✅ Anonymization schema {schema} is valid");
                println!("  Tables: {}", spec.tables.len());
                println!("  Truncated: {}", spec.tables_to_truncate().len());
                println!("  Distinct providers: {}", providers.len());
                println!();
                Ok(exit_code::SUCCESS)
            }
            Err(e) => {
                println!("❌ Anonymization schema {schema} has an invalid rule");
                println!("   Error: {e}");
                Ok(exit_code::CONFIGURATION)
            }
        }
    }
}
