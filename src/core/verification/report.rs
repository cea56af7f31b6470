//! Verification report structures
//!
//! This module defines the structures for reporting what was found in the
//! destination after a partition export.

use crate::domain::PartitionKey;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of checking the exported shards of one partition
#[derive(Debug, Clone, Serialize)]
pub struct PartitionVerification {
    /// When the verification was performed
    pub verified_at: DateTime<Utc>,

    pub partition: PartitionKey,

    /// Number of shard objects found
    pub shards: usize,

    /// Sum of the listed shard sizes
    pub bytes: u64,

    /// Lines counted across the downloaded shards
    pub lines: u64,

    /// Row count reported by the warehouse, if any
    pub expected_rows: Option<u64>,
}

impl PartitionVerification {
    /// Create an empty report for a partition
    pub fn new(partition: PartitionKey) -> Self {
        Self {
            verified_at: Utc::now(),
            partition,
            shards: 0,
            bytes: 0,
            lines: 0,
            expected_rows: None,
        }
    }

    /// Whether any shard was found
    pub fn has_shards(&self) -> bool {
        self.shards > 0
    }

    /// Whether the counted lines match the warehouse row count
    ///
    /// Returns `None` when the warehouse reported no row count.
    pub fn rows_match(&self) -> Option<bool> {
        self.expected_rows.map(|rows| rows == self.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_match() {
        let mut report = PartitionVerification::new(PartitionKey::new("20240101").unwrap());
        assert_eq!(report.rows_match(), None);
        assert!(!report.has_shards());

        report.shards = 1;
        report.lines = 5;
        report.expected_rows = Some(5);
        assert_eq!(report.rows_match(), Some(true));

        report.expected_rows = Some(6);
        assert_eq!(report.rows_match(), Some(false));
    }
}
