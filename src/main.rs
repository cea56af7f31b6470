// Billing Exporter - BigQuery billing export to Cloud Storage
// Copyright (c) 2025 Billing Exporter Contributors
// Licensed under the MIT License

use billing_exporter::cli::commands::{self, exit_code};
use billing_exporter::cli::{Cli, Commands};
use billing_exporter::config::LoggingConfig;
use billing_exporter::logging::init_logging;
use clap::Parser;
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or_default();

    // Export runs log into the table's run log once the configuration is known
    if command != Commands::Export {
        let log_level = cli.log_level.as_deref().unwrap_or("warn");
        if let Err(e) = init_logging(log_level, &LoggingConfig::console_only()) {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(exit_code::FATAL);
        }
    }

    // Create shutdown signal channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
            }
            eprintln!("\nShutdown signal received, saving progress...");
            let _ = shutdown_tx.send(true);
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            } else {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                eprintln!("\nShutdown signal received, saving progress...");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    let exit_code = match execute_command(&cli, command, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            exit_code::FATAL
        }
    };

    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(
    cli: &Cli,
    command: Commands,
    shutdown_signal: watch::Receiver<bool>,
) -> anyhow::Result<i32> {
    let config_file = cli.config_file.as_deref();
    match command {
        Commands::Export => {
            cli.export
                .execute(config_file, cli.log_level.as_deref(), shutdown_signal)
                .await
        }
        Commands::Status => commands::status::execute(config_file).await,
        Commands::ValidateConfig => commands::validate::execute(config_file).await,
    }
}
