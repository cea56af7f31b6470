// Billing Exporter - BigQuery billing export to Cloud Storage
// Copyright (c) 2025 Billing Exporter Contributors
// Licensed under the MIT License

//! # Billing Exporter
//!
//! Exports a day-partitioned BigQuery table (typically the Cloud Billing
//! export) to Cloud Storage one partition at a time, as newline-delimited
//! JSON shards under `<table>/<YYYYMMDD>/billing-export-*.json`.
//!
//! ## Overview
//!
//! Progress is tracked in a status ledger kept in two replicas, a local file
//! and an object next to the exported data. Every partition is recorded as
//! `STARTED` before its extract job is submitted and as `SUCCESS` (with the
//! exported byte total) once the shards are verified, so a crash at any point
//! leaves a ledger the next run can resume and reconcile from.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (export, state, verification)
//! - [`adapters`] - External integrations (BigQuery, Cloud Storage) and
//!   in-memory stand-ins for both
//! - [`domain`] - Partition keys, date ranges and error types
//! - [`config`] - Configuration loading and derived paths
//! - [`logging`] - Structured logging and the uploaded run log
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use billing_exporter::adapters::factory::create_clients;
//! use billing_exporter::config::load_config;
//! use billing_exporter::core::export::{ExportCoordinator, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("exporter.json")?;
//!     let clients = create_clients(&config)?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let summary = ExportCoordinator::new(&config, clients, shutdown_rx)
//!         .execute_export(RunMode::Delta)
//!         .await?;
//!
//!     println!("Exported {} partitions", summary.partitions_succeeded);
//!     Ok(())
//! }
//! ```
//!
//! ## Testing Without Google Cloud
//!
//! The in-memory adapters run the whole pipeline locally:
//!
//! ```rust
//! use billing_exporter::adapters::storage::InMemoryObjectStore;
//! use billing_exporter::adapters::warehouse::InMemoryWarehouse;
//! use billing_exporter::domain::PartitionKey;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryObjectStore::new("archive"));
//! let warehouse = InMemoryWarehouse::new(store.clone());
//! warehouse.add_partition(PartitionKey::new("20240101").unwrap(), 10);
//! ```
//!
//! ## Error Handling
//!
//! Library functions return [`domain::Result`], backed by
//! [`domain::ExporterError`]. Per-partition failures never abort a run; they
//! are collected in the run summary and left for reconciliation.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
