//! Anonymize command implementation

use crate::adapters::database::create_database_client;
use crate::config::schema::FailurePolicy;
use crate::config::{load_anonymization_spec, load_config, PgMaskConfig};
use crate::core::dump::DumpCommand;
use crate::core::orchestrator::{Orchestrator, RunOptions};
use crate::core::summary::{exit_code, exit_code_for, RunSummary};
use crate::providers::ProviderRegistry;
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// Arguments for the anonymize command
#[derive(Args, Debug)]
pub struct AnonymizeArgs {
    /// Anonymization schema (YAML); overrides application.schema_file
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Run every batch but roll its transaction back
    #[arg(long)]
    pub dry_run: bool,

    /// Write a compressed pg_dump here after a successful run
    #[arg(long)]
    pub dump_file: Option<PathBuf>,

    /// SQL executed before anonymization starts
    #[arg(long)]
    pub init_sql: Option<String>,

    /// Override execution.batch_size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override execution.parallel_tables
    #[arg(long)]
    pub parallel_tables: Option<usize>,

    /// Skip remaining tables once one has failed
    #[arg(long)]
    pub stop_on_first_error: bool,

    /// Leave rows whose provider fails unchanged instead of failing the table
    #[arg(long)]
    pub skip_failed_rows: bool,
}

impl AnonymizeArgs {
    /// Execute the anonymize command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting anonymize command");

        let mut config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };
        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(exit_code::CONFIGURATION);
        }

        let Some(schema_path) = config.application.schema_file.clone() else {
            eprintln!("No anonymization schema given: use --schema or application.schema_file");
            return Ok(exit_code::CONFIGURATION);
        };
        let spec = match load_anonymization_spec(&schema_path) {
            Ok(spec) => spec,
            Err(e) => {
                eprintln!("Invalid anonymization schema {schema_path}: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        if config.application.dry_run {
            tracing::info!("Dry run mode enabled - every batch will be rolled back");
            println!("🔍 DRY RUN MODE - No changes will be committed");
            println!();
        } else if !self.yes && !confirm(&config, &schema_path, spec.tables.len())? {
            println!("Anonymization cancelled.");
            return Ok(exit_code::SUCCESS);
        }

        let client = match create_database_client(&config).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create database client");
                eprintln!("Failed to initialize database client: {e}");
                return Ok(exit_code_for(&e));
            }
        };
        if let Err(e) = client.test_connection().await {
            tracing::error!(error = %e, "Database connection test failed");
            eprintln!("Cannot connect to the database: {e}");
            return Ok(exit_code::CONNECTION);
        }

        let orchestrator = Orchestrator::new(
            client,
            ProviderRegistry::builtin(),
            RunOptions::from_config(&config),
            shutdown_signal,
        );

        println!("🚀 Starting anonymization...");
        println!();
        let summary = match orchestrator.run(&spec).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "Anonymization failed");
                eprintln!("Anonymization failed: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        summary.log_summary();
        print_summary(&summary);

        if let Some(dump_file) = &config.application.dump_file {
            if summary.is_successful() && !summary.dry_run {
                let dump =
                    DumpCommand::new(&config.postgresql.connection_string, Path::new(dump_file));
                let result = match dump {
                    Ok(dump) => dump.run().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    tracing::error!(error = %e, "Database dump failed");
                    eprintln!("Database dump failed: {e}");
                    return Ok(exit_code::FATAL);
                }
                println!("💾 Dump written to {dump_file}");
            } else {
                tracing::warn!("Skipping database dump: run was not successful or was a dry run");
            }
        }

        Ok(summary.exit_code())
    }

    fn apply_overrides(&self, config: &mut PgMaskConfig) {
        if let Some(schema) = &self.schema {
            config.application.schema_file = Some(schema.display().to_string());
        }
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
        if let Some(dump_file) = &self.dump_file {
            config.application.dump_file = Some(dump_file.display().to_string());
        }
        if let Some(sql) = &self.init_sql {
            config.application.init_sql = Some(sql.clone());
        }
        if let Some(batch_size) = self.batch_size {
            tracing::info!(batch_size, "Overriding batch size from CLI");
            config.execution.batch_size = batch_size;
        }
        if let Some(parallel) = self.parallel_tables {
            config.execution.parallel_tables = parallel;
        }
        if self.stop_on_first_error {
            config.execution.stop_on_first_error = true;
        }
        if self.skip_failed_rows {
            config.execution.failure_policy = FailurePolicy::SkipRow;
        }
    }
}

fn confirm(config: &PgMaskConfig, schema_path: &str, tables: usize) -> anyhow::Result<bool> {
    use std::io::{self, Write};

    println!("Anonymization Configuration:");
    println!("  Schema: {schema_path}");
    println!("  Tables: {tables}");
    println!("  Batch size: {}", config.execution.batch_size);
    println!("  Failure policy: {}", config.execution.failure_policy);
    println!();
    println!("⚠️  Column values will be overwritten in place.");
    print!("Proceed with anonymization? [y/N]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Anonymization Summary:");
    if summary.dry_run {
        println!("  (dry run - nothing committed)");
    }
    if !summary.truncated.is_empty() {
        let names: Vec<String> = summary.truncated.iter().map(ToString::to_string).collect();
        println!("  Truncated: {}", names.join(", "));
    }
    for result in &summary.results {
        print!(
            "  {:<40} {:<6} read={} updated={} skipped={}",
            result.table.to_string(),
            result.state.to_string(),
            result.rows_read,
            result.rows_updated,
            result.rows_skipped
        );
        match &result.error {
            Some(error) => println!("  ({error})"),
            None => println!(),
        }
    }
    println!("  Rows updated: {}", summary.total_rows_updated());
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    if summary.interrupted {
        println!("  ⚠️  Interrupted by shutdown signal");
    }
    println!();
}
