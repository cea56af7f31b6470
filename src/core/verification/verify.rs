//! Shard verification
//!
//! After an extract job reports success the exported shards are listed and
//! their sizes summed. Each shard is also downloaded to the scratch file and
//! its lines counted, to compare against the warehouse row count.

use super::report::PartitionVerification;
use crate::adapters::storage::{ObjectMeta, ObjectStore};
use crate::config::paths::ensure_parent_dir;
use crate::config::ExportPaths;
use crate::domain::{PartitionKey, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, BufReader};

/// Verifier for exported partition shards
pub struct ShardVerifier {
    store: Arc<dyn ObjectStore>,
    paths: ExportPaths,
}

impl ShardVerifier {
    pub fn new(store: Arc<dyn ObjectStore>, paths: ExportPaths) -> Self {
        Self { store, paths }
    }

    /// Export shards of a partition
    pub async fn list_shards(&self, partition: &PartitionKey) -> Result<Vec<ObjectMeta>> {
        let objects = self
            .store
            .list_objects(&self.paths.partition_prefix(partition))
            .await?;
        Ok(objects
            .into_iter()
            .filter(|o| self.paths.is_shard_of(&o.name, partition))
            .collect())
    }

    /// Shard count and byte total of a partition's destination
    pub async fn destination_totals(&self, partition: &PartitionKey) -> Result<(usize, u64)> {
        let shards = self.list_shards(partition).await?;
        Ok((shards.len(), shards.iter().map(|s| s.size).sum()))
    }

    /// Lists, sizes and line-counts the shards of a partition
    ///
    /// The scratch file is removed afterwards whether counting succeeded or not.
    pub async fn verify(
        &self,
        partition: &PartitionKey,
        expected_rows: Option<u64>,
    ) -> Result<PartitionVerification> {
        let shards = self.list_shards(partition).await?;

        let mut report = PartitionVerification::new(*partition);
        report.shards = shards.len();
        report.bytes = shards.iter().map(|s| s.size).sum();
        report.expected_rows = expected_rows;

        let scratch = self.paths.scratch_file();
        let counted = self.count_shard_lines(&shards, &scratch).await;
        remove_scratch(&scratch).await;
        report.lines = counted?;

        tracing::debug!(
            table_id = %self.paths.table_id(),
            partition = %partition,
            shards = report.shards,
            bytes = report.bytes,
            lines = report.lines,
            "Verified exported shards"
        );

        Ok(report)
    }

    async fn count_shard_lines(&self, shards: &[ObjectMeta], scratch: &Path) -> Result<u64> {
        ensure_parent_dir(scratch)?;
        let mut total = 0;
        for shard in shards {
            self.store.download_to_file(&shard.name, scratch).await?;
            total += count_lines(scratch).await?;
        }
        Ok(total)
    }
}

/// Read size used when counting lines
const READ_CHUNK: usize = 64 * 1024;

/// Newline-delimited records in a file; a final unterminated line counts
///
/// The file is read in fixed-size chunks, never held in memory whole.
pub async fn count_lines(path: &Path) -> Result<u64> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::with_capacity(READ_CHUNK, file);
    let mut buf = vec![0u8; READ_CHUNK];
    let mut newlines = 0u64;
    let mut last = None;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        newlines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        last = Some(buf[n - 1]);
    }

    let unterminated = u64::from(last.is_some_and(|b| b != b'\n'));
    Ok(newlines + unterminated)
}

/// Deletes the scratch file if present
pub async fn remove_scratch(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryObjectStore;
    use tempfile::TempDir;

    fn key(s: &str) -> PartitionKey {
        PartitionKey::new(s).unwrap()
    }

    fn setup() -> (TempDir, Arc<InMemoryObjectStore>, ShardVerifier) {
        let dir = TempDir::new().unwrap();
        let paths = ExportPaths::new(dir.path().to_path_buf(), "billing", "archive");
        let store = Arc::new(InMemoryObjectStore::new("archive"));
        let verifier = ShardVerifier::new(store.clone(), paths);
        (dir, store, verifier)
    }

    #[tokio::test]
    async fn test_verify_sums_shards_and_counts_lines() {
        let (dir, store, verifier) = setup();
        store.insert("billing/20240101/billing-export-000000000000.json", "{\"a\":1}\n{\"a\":2}\n");
        store.insert("billing/20240101/billing-export-000000000001.json", "{\"a\":3}");
        store.insert("billing/20240101/unrelated.txt", "ignored");
        store.insert("billing/20240102/billing-export-000000000000.json", "{}\n");

        let report = verifier.verify(&key("20240101"), Some(3)).await.unwrap();
        assert_eq!(report.shards, 2);
        assert_eq!(report.bytes, 16 + 7);
        assert_eq!(report.lines, 3);
        assert_eq!(report.rows_match(), Some(true));
        assert!(!dir
            .path()
            .join("billing/process_status/temp.json")
            .exists());
    }

    #[tokio::test]
    async fn test_destination_totals_without_shards() {
        let (_dir, _store, verifier) = setup();
        assert_eq!(
            verifier.destination_totals(&key("20240101")).await.unwrap(),
            (0, 0)
        );
    }

    #[tokio::test]
    async fn test_count_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "").unwrap();
        assert_eq!(count_lines(&path).await.unwrap(), 0);
        std::fs::write(&path, "a\nb").unwrap();
        assert_eq!(count_lines(&path).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_count_lines_across_read_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard.json");
        // Lines straddle the chunk boundaries
        let line = "{\"cost\":0.125,\"service\":\"compute\"}\n";
        let lines = 3 * READ_CHUNK / line.len() + 7;
        let mut body = line.repeat(lines);
        std::fs::write(&path, &body).unwrap();
        assert!(body.len() > 3 * READ_CHUNK);
        assert_eq!(count_lines(&path).await.unwrap(), lines as u64);

        body.push_str("{\"cost\":1}");
        std::fs::write(&path, &body).unwrap();
        assert_eq!(count_lines(&path).await.unwrap(), lines as u64 + 1);
    }
}
