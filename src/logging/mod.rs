//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Human-readable console output
//! - JSON output for the cloud logging agent
//! - A per-table run log uploaded next to the status ledger
//!
//! # Example
//!
//! ```no_run
//! use billing_exporter::config::parse_config;
//! use billing_exporter::logging::init_logging;
//!
//! let config = parse_config(r#"{
//!     "source_project_id": "p", "source_dataset_id": "d",
//!     "source_table_id": "t", "destination_bucket": "b"
//! }"#).unwrap();
//! let _guard = init_logging(&config.log_level, &config.logging())
//!     .expect("Failed to initialize logging");
//!
//! tracing::info!(partition = "20240101", "Partition exported");
//! ```

pub mod structured;

pub use structured::{init_logging, parse_log_level, LoggingGuard};
