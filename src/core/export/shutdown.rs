//! Run shutdown
//!
//! The flush runs exactly once per run, on normal completion and on a
//! termination signal alike: persist the ledger to both replicas, upload the
//! run log, remove the scratch file. It performs no partition logic and is
//! safe at any point after the ledger is loaded.

use crate::adapters::storage::ObjectStore;
use crate::config::ExportPaths;
use crate::core::state::{LedgerStore, SharedLedger};
use crate::core::verification::verify::remove_scratch;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// What was flushed, for the caller's summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub ledger_persisted: bool,
    pub log_uploaded: bool,
}

/// Final flush of run state
pub struct ShutdownHandler {
    ledger_store: Arc<LedgerStore>,
    ledger: SharedLedger,
    store: Arc<dyn ObjectStore>,
    paths: ExportPaths,
    log_file: Option<PathBuf>,
}

impl ShutdownHandler {
    pub fn new(
        ledger_store: Arc<LedgerStore>,
        ledger: SharedLedger,
        store: Arc<dyn ObjectStore>,
        paths: ExportPaths,
    ) -> Self {
        Self {
            ledger_store,
            ledger,
            store,
            paths,
            log_file: None,
        }
    }

    /// Run log to upload on flush
    pub fn with_log_file(mut self, log_file: PathBuf) -> Self {
        self.log_file = Some(log_file);
        self
    }

    /// Persists the ledger, uploads the run log and removes the scratch file
    ///
    /// Every step is attempted even when an earlier one fails.
    pub async fn flush(&self, reason: &str) -> FlushReport {
        let mut report = FlushReport::default();

        match self.ledger_store.persist_shared(&self.ledger).await {
            Ok(()) => report.ledger_persisted = true,
            Err(e) => tracing::error!(error = %e, "Failed to persist status ledger at shutdown"),
        }

        remove_scratch(&self.paths.scratch_file()).await;

        tracing::info!(
            table_id = %self.paths.table_id(),
            reason = reason,
            ledger_persisted = report.ledger_persisted,
            "Exporter stopping"
        );

        // Uploaded last so the closing message is part of it
        if let Some(log_file) = &self.log_file {
            let object = self.paths.remote_log_object();
            match self.store.upload_file(&object, log_file).await {
                Ok(()) => report.log_uploaded = true,
                Err(e) => tracing::warn!(
                    path = %log_file.display(),
                    object = %object,
                    error = %e,
                    "Failed to upload run log"
                ),
            }
        }

        report
    }
}

/// Resolves once the shutdown flag is raised
///
/// A flag raised before the call resolves immediately. A dropped sender
/// never resolves.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryObjectStore;
    use crate::core::state::StatusLedger;
    use crate::domain::PartitionKey;
    use std::time::Duration;
    use tempfile::TempDir;

    fn key(s: &str) -> PartitionKey {
        PartitionKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_flush_persists_uploads_and_cleans() {
        let dir = TempDir::new().unwrap();
        let paths = ExportPaths::new(dir.path().to_path_buf(), "billing", "archive");
        let store = Arc::new(InMemoryObjectStore::new("archive"));
        let mut ledger = StatusLedger::new();
        ledger.mark_started(key("20240101"));
        let ledger = ledger.into_shared();

        std::fs::create_dir_all(paths.local_process_status_dir()).unwrap();
        std::fs::write(paths.scratch_file(), "{}\n").unwrap();
        std::fs::write(paths.local_log_file(), "run log\n").unwrap();

        let handler = ShutdownHandler::new(
            Arc::new(LedgerStore::new(&paths, store.clone())),
            ledger,
            store.clone(),
            paths.clone(),
        )
        .with_log_file(paths.local_log_file());

        let report = handler.flush("signal").await;
        assert!(report.ledger_persisted);
        assert!(report.log_uploaded);
        assert!(!paths.scratch_file().exists());
        assert!(paths.local_status_file().exists());

        let remote = store.get(&paths.remote_status_object()).unwrap();
        let remote = StatusLedger::from_json(&remote).unwrap();
        assert!(remote.get(&key("20240101")).is_some());
        assert!(store.get(&paths.remote_log_object()).is_some());
    }

    #[tokio::test]
    async fn test_flush_without_log_file() {
        let dir = TempDir::new().unwrap();
        let paths = ExportPaths::new(dir.path().to_path_buf(), "billing", "archive");
        let store = Arc::new(InMemoryObjectStore::new("archive"));
        let handler = ShutdownHandler::new(
            Arc::new(LedgerStore::new(&paths, store.clone())),
            StatusLedger::new().into_shared(),
            store.clone(),
            paths.clone(),
        );

        let report = handler.flush("completed").await;
        assert!(report.ledger_persisted);
        assert!(!report.log_uploaded);
        assert!(store.get(&paths.remote_log_object()).is_none());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_sees_earlier_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_ignores_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited =
            tokio::time::timeout(Duration::from_millis(50), wait_for_shutdown(&mut rx)).await;
        assert!(waited.is_err());
    }
}
