//! CLI interface and argument parsing
//!
//! This module provides the command-line interface using clap. Flags keep
//! their historical underscore spelling (`--config_file`, `--historical_run`)
//! so existing schedulers keep working. Without a subcommand the exporter runs.

pub mod commands;

use clap::{Parser, Subcommand};

/// Billing Exporter - BigQuery billing export to Cloud Storage
#[derive(Parser, Debug)]
#[command(name = "billing-exporter")]
#[command(version, about, long_about = None)]
#[command(author = "Billing Exporter Contributors")]
pub struct Cli {
    /// Path to the JSON configuration file; instance metadata is used when absent
    #[arg(long = "config_file", env = "EXPORTER_CONFIG_FILE", global = true)]
    pub config_file: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the configuration
    #[arg(long = "log_level", global = true)]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub export: commands::export::ExportArgs,

    /// Subcommand to execute, `export` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Commands {
    /// Export partitions to the destination bucket
    #[default]
    Export,

    /// Show both ledger replicas and the merge result
    Status,

    /// Validate the configuration
    ValidateConfig,
}
