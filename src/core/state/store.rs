//! Ledger persistence across the local and remote replicas
//!
//! Both replicas receive every write. At startup the replica whose latest
//! partition date is more recent becomes the working ledger; equal dates
//! select the local replica.

use super::ledger::{SharedLedger, StatusLedger};
use crate::adapters::storage::ObjectStore;
use crate::config::paths::ensure_parent_dir;
use crate::config::ExportPaths;
use crate::domain::{ExporterError, PartitionKey, Result};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One of the two ledger copies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replica {
    Local,
    Remote,
}

impl fmt::Display for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replica::Local => write!(f, "local"),
            Replica::Remote => write!(f, "remote"),
        }
    }
}

/// What reading one replica produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaState {
    /// No file or object
    Missing,
    /// The read itself failed
    Unreadable(String),
    /// Content could not be parsed or holds no records
    Malformed(String),
    Loaded(StatusLedger),
}

impl ReplicaState {
    /// Classifies raw replica content
    pub fn from_content(data: Option<Vec<u8>>) -> Self {
        let Some(data) = data else {
            return ReplicaState::Missing;
        };
        match StatusLedger::from_json(&data) {
            Ok(ledger) if ledger.is_empty() => {
                ReplicaState::Malformed("ledger has no records".to_string())
            }
            Ok(ledger) => ReplicaState::Loaded(ledger),
            Err(e) => ReplicaState::Malformed(e.to_string()),
        }
    }

    /// The ledger, when the replica is usable
    pub fn ledger(&self) -> Option<&StatusLedger> {
        match self {
            ReplicaState::Loaded(ledger) => Some(ledger),
            _ => None,
        }
    }

    /// Latest partition of a usable replica
    pub fn latest_partition(&self) -> Option<PartitionKey> {
        self.ledger().and_then(StatusLedger::latest_partition)
    }

    /// The replica's ledger and whether it existed in usable form
    pub fn into_ledger(self) -> (StatusLedger, bool) {
        match self {
            ReplicaState::Loaded(ledger) => (ledger, true),
            _ => (StatusLedger::new(), false),
        }
    }

    /// One-line description for logs and the status command
    pub fn describe(&self) -> String {
        match self {
            ReplicaState::Missing => "missing".to_string(),
            ReplicaState::Unreadable(e) => format!("unreadable ({e})"),
            ReplicaState::Malformed(e) => format!("malformed ({e})"),
            ReplicaState::Loaded(ledger) => match ledger.latest_partition() {
                Some(latest) => format!("{} records, latest {latest}", ledger.len()),
                None => "empty".to_string(),
            },
        }
    }
}

/// Working ledger selected at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub ledger: StatusLedger,

    /// Where a delta run starts
    pub resume_date: PartitionKey,

    /// Replica the ledger came from, `None` when neither was usable
    pub source: Option<Replica>,
}

/// Picks the more advanced replica
///
/// Unusable replicas count as absent. With neither usable the result is an
/// empty ledger resuming from the beginning of history.
pub fn merge(local: ReplicaState, remote: ReplicaState) -> MergeOutcome {
    let local_latest = local.latest_partition();
    let remote_latest = remote.latest_partition();

    let (state, latest, source) = match (local_latest, remote_latest) {
        (None, None) => {
            return MergeOutcome {
                ledger: StatusLedger::new(),
                resume_date: PartitionKey::history_start(),
                source: None,
            }
        }
        (Some(l), None) => (local, l, Replica::Local),
        (None, Some(r)) => (remote, r, Replica::Remote),
        (Some(l), Some(r)) if r > l => (remote, r, Replica::Remote),
        (Some(l), Some(_)) => (local, l, Replica::Local),
    };

    MergeOutcome {
        ledger: state.into_ledger().0,
        resume_date: latest,
        source: Some(source),
    }
}

/// Reads and writes both ledger replicas
pub struct LedgerStore {
    local_path: PathBuf,
    remote_object: String,
    store: Arc<dyn ObjectStore>,
}

impl LedgerStore {
    pub fn new(paths: &ExportPaths, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            local_path: paths.local_status_file(),
            remote_object: paths.remote_status_object(),
            store,
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_object(&self) -> &str {
        &self.remote_object
    }

    pub async fn load_local(&self) -> ReplicaState {
        match tokio::fs::read(&self.local_path).await {
            Ok(data) => ReplicaState::from_content(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => ReplicaState::Missing,
            Err(e) => ReplicaState::Unreadable(e.to_string()),
        }
    }

    pub async fn load_remote(&self) -> ReplicaState {
        match self.store.read_object(&self.remote_object).await {
            Ok(data) => ReplicaState::from_content(data),
            Err(e) => ReplicaState::Unreadable(e.to_string()),
        }
    }

    /// Loads both replicas and selects the working ledger
    ///
    /// A local replica that is missing or malformed is replaced by an empty
    /// ledger file. Read failures on either side are tolerated.
    pub async fn load(&self) -> MergeOutcome {
        let local = self.load_local().await;
        let remote = self.load_remote().await;

        tracing::info!(
            local = %local.describe(),
            remote = %remote.describe(),
            "Loaded status ledger replicas"
        );

        if matches!(local, ReplicaState::Missing | ReplicaState::Malformed(_)) {
            tracing::debug!(path = %self.local_path.display(), "Creating empty local status file");
            if let Err(e) = self.write_local(&StatusLedger::new()).await {
                tracing::warn!(
                    path = %self.local_path.display(),
                    error = %e,
                    "Failed to create local status file"
                );
            }
        }

        let outcome = merge(local, remote);
        match outcome.source {
            Some(source) => tracing::info!(
                replica = %source,
                resume_date = %outcome.resume_date,
                "Selected status ledger replica"
            ),
            None => tracing::info!(
                resume_date = %outcome.resume_date,
                "No usable status ledger, starting from the beginning of history"
            ),
        }
        outcome
    }

    async fn write_local(&self, ledger: &StatusLedger) -> Result<()> {
        let data = ledger.to_json()?;
        ensure_parent_dir(&self.local_path)?;

        // Write beside the target, then rename over it
        let mut tmp = self.local_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.local_path).await?;
        Ok(())
    }

    async fn write_remote(&self, ledger: &StatusLedger) -> Result<()> {
        let data = ledger.to_json()?;
        self.store.write_object(&self.remote_object, data).await
    }

    /// Writes the ledger to both replicas, fully replacing each
    ///
    /// # Errors
    ///
    /// Fails only when neither replica could be written.
    pub async fn persist(&self, ledger: &StatusLedger) -> Result<()> {
        let local = self.write_local(ledger).await;
        let remote = self.write_remote(ledger).await;

        match (local, remote) {
            (Ok(()), Ok(())) => {
                tracing::trace!(records = ledger.len(), "Persisted status ledger");
                Ok(())
            }
            (Err(e), Ok(())) => {
                tracing::warn!(
                    path = %self.local_path.display(),
                    error = %e,
                    "Failed to write local status file"
                );
                Ok(())
            }
            (Ok(()), Err(e)) => {
                tracing::warn!(
                    object = %self.remote_object,
                    error = %e,
                    "Failed to write remote status file"
                );
                Ok(())
            }
            (Err(local), Err(remote)) => Err(ExporterError::Ledger(format!(
                "failed to write both status replicas (local: {local}; remote: {remote})"
            ))),
        }
    }

    /// Persists a snapshot of a shared ledger
    ///
    /// The lock is held only while cloning, never across the writes.
    pub async fn persist_shared(&self, ledger: &SharedLedger) -> Result<()> {
        let snapshot = ledger.lock().await.clone();
        self.persist(&snapshot).await
    }
}
