//! Export coordinator - main orchestrator for the export process
//!
//! Loads the ledger, resolves the run's date range, drives the extraction
//! engine and (for delta runs) reconciliation, and flushes state exactly once
//! whether the run completes, fails or is interrupted by a signal.

use super::engine::{EngineSettings, ExtractionEngine};
use super::range::{self, RunMode};
use super::reconcile::ReconciliationPass;
use super::shutdown::{wait_for_shutdown, ShutdownHandler};
use super::summary::ExportSummary;
use crate::adapters::factory::Clients;
use crate::adapters::storage::ObjectStore;
use crate::adapters::warehouse::Warehouse;
use crate::config::{ExportPaths, ExporterConfig};
use crate::core::state::LedgerStore;
use crate::core::verification::ShardVerifier;
use crate::domain::{ExporterError, Result, StorageError, TableRef};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// How the main pass ended
enum RunEnd {
    Completed,
    Failed(ExporterError),
    Interrupted,
}

/// Export coordinator
pub struct ExportCoordinator {
    warehouse: Arc<dyn Warehouse>,
    store: Arc<dyn ObjectStore>,
    paths: ExportPaths,
    table: TableRef,
    settings: EngineSettings,
    shutdown_signal: watch::Receiver<bool>,
    log_file: Option<PathBuf>,
    today: Option<NaiveDate>,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    pub fn new(
        config: &ExporterConfig,
        clients: Clients,
        shutdown_signal: watch::Receiver<bool>,
    ) -> Self {
        Self {
            warehouse: clients.warehouse,
            store: clients.store,
            paths: config.paths(),
            table: config.table_ref(),
            settings: EngineSettings {
                location: config.location.clone(),
                extract_timeout: config.extract_timeout(),
            },
            shutdown_signal,
            log_file: None,
            today: None,
        }
    }

    /// Run log uploaded when the run stops
    pub fn with_log_file(mut self, log_file: PathBuf) -> Self {
        self.log_file = Some(log_file);
        self
    }

    /// Fixes the date ranges resolve against instead of the local clock
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Execute the export
    ///
    /// 1. Checks the destination bucket exists
    /// 2. Loads and merges both ledger replicas
    /// 3. Exports every partition of the resolved range
    /// 4. Reconciles incomplete partitions (delta runs only)
    /// 5. Flushes ledger and run log
    ///
    /// A termination signal stops steps 3 and 4 at the next await point; the
    /// partition in flight stays `STARTED`.
    ///
    /// # Errors
    ///
    /// Fails when the bucket is missing or unreachable, or when the main
    /// range cannot be enumerated. Partition failures are reported in the
    /// summary instead.
    pub async fn execute_export(&self, mode: RunMode) -> Result<ExportSummary> {
        let start_time = Instant::now();
        let mut summary = ExportSummary::new();

        tracing::info!(
            table_id = %self.table.table_id,
            bucket = %self.paths.bucket(),
            mode = %mode,
            "Starting export process"
        );

        if !self.store.bucket_exists().await? {
            tracing::error!(bucket = %self.paths.bucket(), "Destination bucket does not exist");
            return Err(StorageError::BucketNotFound(self.paths.bucket().to_string()).into());
        }

        let ledger_store = Arc::new(LedgerStore::new(&self.paths, Arc::clone(&self.store)));
        let loaded = ledger_store.load().await;
        let resume_date = loaded.resume_date;
        let ledger = loaded.ledger.into_shared();

        let mut handler = ShutdownHandler::new(
            Arc::clone(&ledger_store),
            Arc::clone(&ledger),
            Arc::clone(&self.store),
            self.paths.clone(),
        );
        if let Some(log_file) = &self.log_file {
            handler = handler.with_log_file(log_file.clone());
        }

        let engine = ExtractionEngine::new(
            Arc::clone(&self.warehouse),
            ledger,
            ledger_store,
            ShardVerifier::new(Arc::clone(&self.store), self.paths.clone()),
            self.paths.clone(),
            self.table.clone(),
            self.settings.clone(),
        );

        let today = self.today.unwrap_or_else(range::today);
        let range = mode.resolve(resume_date, today);
        tracing::info!(range = %range, resume_date = %resume_date, "Resolved export range");

        let mut shutdown_signal = self.shutdown_signal.clone();
        let end = {
            let work = async {
                engine.process_range(range, &mut summary).await?;
                if mode.runs_reconciliation() {
                    ReconciliationPass::new(&engine).reconcile(&mut summary).await;
                }
                Ok::<(), ExporterError>(())
            };

            tokio::select! {
                result = work => match result {
                    Ok(()) => RunEnd::Completed,
                    Err(e) => RunEnd::Failed(e),
                },
                _ = wait_for_shutdown(&mut shutdown_signal) => RunEnd::Interrupted,
            }
        };

        let reason = match &end {
            RunEnd::Completed => "completed",
            RunEnd::Failed(_) => "failed",
            RunEnd::Interrupted => "signal",
        };
        if matches!(end, RunEnd::Interrupted) {
            tracing::warn!("Shutdown signal received, flushing state");
            summary.mark_interrupted("Shutdown signal received");
        }

        summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        handler.flush(reason).await;

        match end {
            RunEnd::Failed(e) => {
                tracing::error!(error = %e, "Export aborted");
                Err(e)
            }
            RunEnd::Completed | RunEnd::Interrupted => Ok(summary),
        }
    }
}
