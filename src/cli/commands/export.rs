//! Export command implementation
//!
//! Resolves the configuration and run mode, starts logging into the table's
//! run log, and drives the export coordinator.

use super::exit_code;
use crate::adapters::factory::create_clients;
use crate::config::resolve_config;
use crate::core::export::{ExportCoordinator, ExportSummary, RunMode};
use crate::domain::{ExporterError, StorageError, WarehouseError};
use crate::logging::init_logging;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};
use tokio::sync::watch;

/// Arguments for the export run
#[derive(Args, Debug, Default)]
pub struct ExportArgs {
    /// First partition to export (YYYYMMDD), requires --export_end_date
    #[arg(long = "export_start_date", value_name = "YYYYMMDD")]
    pub export_start_date: Option<String>,

    /// Partition after the last one to export (YYYYMMDD, exclusive)
    #[arg(long = "export_end_date", value_name = "YYYYMMDD")]
    pub export_end_date: Option<String>,

    /// Replay every partition since 19990101
    #[arg(
        long = "historical_run",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub historical_run: bool,
}

impl ExportArgs {
    /// Run mode selected by the date flags
    pub fn run_mode(&self) -> crate::domain::Result<RunMode> {
        RunMode::from_args(
            self.export_start_date.as_deref(),
            self.export_end_date.as_deref(),
            self.historical_run,
        )
    }

    /// Execute the export command
    pub async fn execute(
        &self,
        config_file: Option<&str>,
        log_level: Option<&str>,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let mode = match self.run_mode() {
            Ok(mode) => mode,
            Err(e) => {
                eprintln!("Invalid arguments: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        let config = match resolve_config(config_file).await {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        let level = log_level.unwrap_or(&config.log_level);
        let guard = match init_logging(level, &config.logging()) {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Failed to initialize logging: {e}");
                return Ok(exit_code::FATAL);
            }
        };

        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            project = %config.source_project_id,
            dataset = %config.source_dataset_id,
            table_id = %config.source_table_id,
            bucket = %config.destination_bucket,
            "Billing exporter started"
        );
        if self.historical_run && matches!(mode, RunMode::Explicit(_)) {
            tracing::warn!("Both explicit dates and --historical_run given, using the explicit range");
        }

        let clients = match create_clients(&config) {
            Ok(clients) => clients,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create clients");
                eprintln!("Failed to initialize export: {e}");
                return Ok(exit_code::CONNECTION);
            }
        };

        let mut coordinator = ExportCoordinator::new(&config, clients, shutdown_signal);
        if let Some(log_file) = guard.log_file() {
            coordinator = coordinator.with_log_file(log_file.to_path_buf());
        }

        let summary = match coordinator.execute_export(mode).await {
            Ok(summary) => summary,
            Err(e) => {
                eprintln!("Export failed: {e}");
                return Ok(exit_code_for_error(&e));
            }
        };

        print_summary(&summary);
        Ok(exit_code_for_summary(&summary))
    }
}

/// Exit code for an export that could not run to completion
pub fn exit_code_for_error(error: &ExporterError) -> i32 {
    match error {
        ExporterError::Configuration(_) | ExporterError::Validation(_) => exit_code::CONFIGURATION,
        ExporterError::Storage(StorageError::BucketNotFound(_))
        | ExporterError::Storage(StorageError::ConnectionFailed(_))
        | ExporterError::Warehouse(WarehouseError::ConnectionFailed(_))
        | ExporterError::Authentication(_) => exit_code::CONNECTION,
        _ => exit_code::FATAL,
    }
}

/// Exit code for a finished or interrupted export
pub fn exit_code_for_summary(summary: &ExportSummary) -> i32 {
    if summary.interrupted {
        exit_code::INTERRUPTED
    } else if summary.is_successful() {
        exit_code::SUCCESS
    } else {
        exit_code::PARTIAL_FAILURE
    }
}

fn print_summary(summary: &ExportSummary) {
    println!();
    println!("Export Summary:");
    if let Some(range) = summary.range {
        println!("  Range: {range}");
    }
    println!("  Partitions Enumerated: {}", summary.partitions_enumerated);
    println!("  Skipped (already exported): {}", summary.partitions_skipped);
    println!("  Succeeded: {}", summary.partitions_succeeded);
    println!("  Failed: {}", summary.partitions_failed);
    println!("  Reconciled: {}", summary.partitions_reconciled);
    println!("  Bytes Written: {}", summary.bytes_written);
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!("  Success Rate: {:.2}%", summary.success_rate());
    println!();

    if !summary.errors.is_empty() {
        println!("Errors encountered:");
        for error in &summary.errors {
            match error.partition {
                Some(partition) => {
                    println!("  - {:?} [{partition}]: {}", error.error_type, error.message)
                }
                None => println!("  - {:?}: {}", error.error_type, error.message),
            }
        }
        println!();
    }

    if summary.interrupted {
        println!("Export interrupted. Ledger saved; the next run resumes from it.");
    } else if summary.is_successful() {
        println!("Export completed successfully!");
    } else {
        println!("Export completed with failures");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_args_default_to_delta() {
        let args = ExportArgs::default();
        assert_eq!(args.run_mode().unwrap(), RunMode::Delta);
    }

    #[test]
    fn test_export_args_single_date_is_rejected() {
        let args = ExportArgs {
            export_start_date: Some("20240101".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            args.run_mode(),
            Err(ExporterError::Configuration(_))
        ));
    }

    #[test]
    fn test_exit_codes_for_errors() {
        let missing = ExporterError::from(StorageError::BucketNotFound("archive".to_string()));
        assert_eq!(exit_code_for_error(&missing), exit_code::CONNECTION);
        assert_eq!(
            exit_code_for_error(&ExporterError::Enumeration("boom".to_string())),
            exit_code::FATAL
        );
        assert_eq!(
            exit_code_for_error(&ExporterError::Configuration("bad".to_string())),
            exit_code::CONFIGURATION
        );
    }

    #[test]
    fn test_exit_codes_for_summary() {
        let mut summary = ExportSummary::new();
        assert_eq!(exit_code_for_summary(&summary), exit_code::SUCCESS);
        summary.partitions_failed = 1;
        assert_eq!(exit_code_for_summary(&summary), exit_code::PARTIAL_FAILURE);
        summary.mark_interrupted("signal");
        assert_eq!(exit_code_for_summary(&summary), exit_code::INTERRUPTED);
    }
}
