//! Local file and object-store locations used by one export run
//!
//! Everything the exporter writes is keyed by the source table id, so one
//! bucket (and one working directory) can serve several tables.

use crate::domain::PartitionKey;
use std::path::{Path, PathBuf};

const PROCESS_STATUS_DIR: &str = "process_status";
const STATUS_FILE_NAME: &str = "extract_status_file.json";
const LOG_FILE_NAME: &str = "exporter.log";
const SCRATCH_FILE_NAME: &str = "temp.json";
const SHARD_FILE_PREFIX: &str = "billing-export-";

/// Derived paths for a single table export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    status_root: PathBuf,
    table_id: String,
    bucket: String,
}

impl ExportPaths {
    pub fn new(status_root: PathBuf, table_id: &str, bucket: &str) -> Self {
        Self {
            status_root,
            table_id: table_id.to_string(),
            bucket: bucket.to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Local directory holding the status file, run log and scratch file
    pub fn local_process_status_dir(&self) -> PathBuf {
        self.status_root.join(&self.table_id).join(PROCESS_STATUS_DIR)
    }

    /// Local replica of the status ledger
    pub fn local_status_file(&self) -> PathBuf {
        self.local_process_status_dir().join(STATUS_FILE_NAME)
    }

    /// Local run log
    pub fn local_log_file(&self) -> PathBuf {
        self.local_process_status_dir().join(LOG_FILE_NAME)
    }

    /// Scratch file used while counting shard lines
    pub fn scratch_file(&self) -> PathBuf {
        self.local_process_status_dir().join(SCRATCH_FILE_NAME)
    }

    /// Object name of the remote ledger replica
    pub fn remote_status_object(&self) -> String {
        format!("{}/{PROCESS_STATUS_DIR}/{STATUS_FILE_NAME}", self.table_id)
    }

    /// Object name the run log is uploaded to
    pub fn remote_log_object(&self) -> String {
        format!("{}/{PROCESS_STATUS_DIR}/{LOG_FILE_NAME}", self.table_id)
    }

    /// Listing prefix for everything exported for a partition
    pub fn partition_prefix(&self, key: &PartitionKey) -> String {
        format!("{}/{key}/", self.table_id)
    }

    /// Name prefix every export shard of a partition starts with
    pub fn shard_prefix(&self, key: &PartitionKey) -> String {
        format!("{}/{key}/{SHARD_FILE_PREFIX}", self.table_id)
    }

    /// Wildcard destination URI handed to the extract job
    pub fn destination_uri(&self, key: &PartitionKey) -> String {
        format!(
            "gs://{}/{}/{key}/{SHARD_FILE_PREFIX}*.json",
            self.bucket, self.table_id
        )
    }

    /// Whether an object name is an export shard of the partition
    pub fn is_shard_of(&self, name: &str, key: &PartitionKey) -> bool {
        name.starts_with(&self.shard_prefix(key))
    }
}

/// Makes sure the parent directory of a file exists
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
