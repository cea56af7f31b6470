//! Core business logic for the exporter.
//!
//! # Modules
//!
//! - [`export`] - Range resolution, extraction, reconciliation and shutdown
//! - [`state`] - The status ledger and its local/remote replicas
//! - [`verification`] - Shard listing, byte totals and line counts
//!
//! # Export Workflow
//!
//! 1. **Load State**: Read both ledger replicas and keep the more advanced one
//! 2. **Resolve Range**: Explicit dates, full history, or resume date to tomorrow
//! 3. **Enumerate**: Ask the warehouse which day partitions exist in range
//! 4. **Extract**: Per partition, record `STARTED`, run the extract job, verify
//!    the shards and record `SUCCESS` with the byte total
//! 5. **Reconcile** (delta runs): retry anything lacking a verified success
//! 6. **Flush**: Persist the ledger and upload the run log
//!
//! # Example
//!
//! ```rust,no_run
//! use billing_exporter::adapters::factory::create_clients;
//! use billing_exporter::config::load_config;
//! use billing_exporter::core::export::{ExportCoordinator, RunMode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("exporter.json")?;
//! let clients = create_clients(&config)?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let coordinator = ExportCoordinator::new(&config, clients, shutdown_rx);
//!
//! let summary = coordinator.execute_export(RunMode::Delta).await?;
//! println!("Succeeded: {}", summary.partitions_succeeded);
//! println!("Failed: {}", summary.partitions_failed);
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod state;
pub mod verification;
