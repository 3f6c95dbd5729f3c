// pgmask - In-place PostgreSQL Anonymization Tool
// Copyright (c) 2025 pgmask Contributors
// Licensed under the MIT License

use pgmask::cli::{Cli, Commands};
use pgmask::config::{load_config, LoggingConfig};
use pgmask::core::summary::exit_code;
use pgmask::logging::{init_logging, LoggingGuard};
use clap::Parser;
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let guard = setup_logging(&cli);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "pgmask - In-place PostgreSQL Anonymization Tool"
    );

    // Create shutdown signal channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => Some(sigterm),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    None
                }
            };
            let terminate = async {
                match sigterm.as_mut() {
                    Some(sigterm) => {
                        sigterm.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                }
                _ = terminate => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                }
            }
            println!("\n⚠️  Shutdown signal received, finishing in-flight batches...");
            let _ = shutdown_tx.send(true);
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            } else {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                println!("\n⚠️  Shutdown signal received, finishing in-flight batches...");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    let code = match execute_command(&cli, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            exit_code::FATAL
        }
    };

    // Flush the file writer before exiting
    drop(guard);
    process::exit(code);
}

/// Initialize logging from the config file when it loads, console-only otherwise
fn setup_logging(cli: &Cli) -> Option<LoggingGuard> {
    let loaded = load_config(&cli.config).ok();
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().map(|c| c.application.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());

    let console_only = LoggingConfig {
        local_enabled: false,
        ..LoggingConfig::default()
    };
    let logging_config = match (&loaded, &cli.command) {
        (Some(config), Commands::Anonymize(_)) => config.logging.clone(),
        _ => console_only.clone(),
    };

    match init_logging(&log_level, &logging_config) {
        Ok(guard) => Some(guard),
        Err(e) if logging_config.local_enabled => {
            eprintln!("File logging unavailable ({e}), logging to console only");
            init_logging(&log_level, &console_only).ok()
        }
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(exit_code::CONFIGURATION);
        }
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, shutdown_signal: watch::Receiver<bool>) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Anonymize(args) => args.execute(&cli.config, shutdown_signal).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Providers(args) => args.execute().await,
    }
}
