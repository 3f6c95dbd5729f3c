//! CLI interface and argument parsing

pub mod commands;

use clap::{Parser, Subcommand};

/// pgmask - in-place PostgreSQL anonymization
#[derive(Parser, Debug)]
#[command(name = "pgmask")]
#[command(version, about, long_about = None)]
#[command(author = "pgmask Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "pgmask.toml", env = "PGMASK_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PGMASK_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Anonymize the configured database in place
    Anonymize(commands::anonymize::AnonymizeArgs),

    /// Validate the configuration and anonymization schema without connecting
    ValidateConfig(commands::validate::ValidateArgs),

    /// List the available anonymization strategies
    Providers(commands::providers::ProvidersArgs),
}
