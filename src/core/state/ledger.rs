//! Status ledger model
//!
//! The ledger holds one record per partition export attempt. On disk (and in
//! the bucket) it is a JSON document:
//!
//! ```json
//! {
//!     "extract_status": [
//!         {
//!             "run_timestamp": "20240102 03:04:05.678",
//!             "export_date_partition": "20240102",
//!             "status": "success",
//!             "bytes": 5120
//!         },
//!         {
//!             "run_timestamp": "20240102 03:00:00.000",
//!             "export_date_partition": "20240101"
//!         }
//!     ]
//! }
//! ```
//!
//! A record without `status` is a started attempt. Newly started records are
//! prepended, so array order is not date order.

use crate::domain::{ExporterError, PartitionKey, Result};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Format of `run_timestamp`, millisecond precision
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d %H:%M:%S%.3f";

/// Ledger shared between the export run and the shutdown path
pub type SharedLedger = Arc<Mutex<StatusLedger>>;

/// Export status of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractStatus {
    /// Attempt recorded, not (yet) verified complete
    #[default]
    #[serde(alias = "STARTED")]
    Started,
    /// Export verified complete
    #[serde(alias = "SUCCESS")]
    Success,
}

impl ExtractStatus {
    pub fn is_started(&self) -> bool {
        *self == Self::Started
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl std::fmt::Display for ExtractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::Success => write!(f, "SUCCESS"),
        }
    }
}

/// One partition export attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// When the attempt was recorded as started
    #[serde(with = "run_timestamp")]
    pub run_timestamp: NaiveDateTime,

    #[serde(rename = "export_date_partition")]
    pub partition: PartitionKey,

    #[serde(default, skip_serializing_if = "ExtractStatus::is_started")]
    pub status: ExtractStatus,

    /// Total size of the exported shards, only set on success
    #[serde(rename = "bytes", default, skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
}

impl StatusRecord {
    /// A started record stamped with the current time
    pub fn started(partition: PartitionKey) -> Self {
        Self {
            run_timestamp: now(),
            partition,
            status: ExtractStatus::Started,
            bytes_written: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Current UTC time truncated to milliseconds
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    let formatted = now.format(RUN_TIMESTAMP_FORMAT).to_string();
    NaiveDateTime::parse_from_str(&formatted, RUN_TIMESTAMP_FORMAT).unwrap_or(now)
}

mod run_timestamp {
    use super::RUN_TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(RUN_TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, RUN_TIMESTAMP_FORMAT)
            .map_err(|e| serde::de::Error::custom(format!("invalid run_timestamp '{raw}': {e}")))
    }
}

/// Per-partition export history
///
/// Holds at most one record per partition. A partition without a record, or
/// with a record that is not [`ExtractStatus::Success`], still needs export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLedger {
    #[serde(rename = "extract_status", default)]
    records: Vec<StatusRecord>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from records, keeping one record per partition
    ///
    /// When a partition appears more than once the first record wins, unless
    /// a later one is a success and the first is not.
    pub fn from_records(records: Vec<StatusRecord>) -> Self {
        let mut kept: Vec<StatusRecord> = Vec::with_capacity(records.len());
        let mut index: HashMap<PartitionKey, usize> = HashMap::new();

        for record in records {
            match index.get(&record.partition) {
                Some(&i) => {
                    if record.is_success() && !kept[i].is_success() {
                        kept[i] = record;
                    }
                }
                None => {
                    index.insert(record.partition, kept.len());
                    kept.push(record);
                }
            }
        }

        Self { records: kept }
    }

    /// Parses the ledger document
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let parsed: StatusLedger = serde_json::from_slice(data)?;
        Ok(Self::from_records(parsed.records))
    }

    /// Serializes the ledger document with four-space indentation
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }

    /// Records in document order (newest started first)
    pub fn records(&self) -> &[StatusRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, partition: &PartitionKey) -> Option<&StatusRecord> {
        self.records.iter().find(|r| r.partition == *partition)
    }

    fn get_mut(&mut self, partition: &PartitionKey) -> Option<&mut StatusRecord> {
        self.records.iter_mut().find(|r| r.partition == *partition)
    }

    /// Whether the partition has a success record
    pub fn is_completed(&self, partition: &PartitionKey) -> bool {
        self.get(partition).is_some_and(StatusRecord::is_success)
    }

    /// Records a started attempt
    ///
    /// Returns `false` without touching the ledger when the partition already
    /// has a record.
    pub fn mark_started(&mut self, partition: PartitionKey) -> bool {
        if self.get(&partition).is_some() {
            return false;
        }
        self.records.insert(0, StatusRecord::started(partition));
        true
    }

    /// Puts the partition back to started, clearing bytes and refreshing the
    /// timestamp, or inserts a started record when there is none
    pub fn reset_started(&mut self, partition: PartitionKey) {
        match self.get_mut(&partition) {
            Some(record) => {
                record.status = ExtractStatus::Started;
                record.bytes_written = None;
                record.run_timestamp = now();
            }
            None => {
                self.records.insert(0, StatusRecord::started(partition));
            }
        }
    }

    /// Moves an existing record to success
    ///
    /// # Errors
    ///
    /// Returns a ledger error if the partition was never marked started.
    pub fn mark_success(&mut self, partition: &PartitionKey, bytes_written: u64) -> Result<()> {
        let record = self.get_mut(partition).ok_or_else(|| {
            ExporterError::Ledger(format!("partition {partition} has no started record"))
        })?;
        record.status = ExtractStatus::Success;
        record.bytes_written = Some(bytes_written);
        Ok(())
    }

    /// The most recent partition by date
    pub fn latest_partition(&self) -> Option<PartitionKey> {
        self.records.iter().map(|r| r.partition).max()
    }

    /// Partitions without a success record, ascending by date
    pub fn incomplete_partitions(&self) -> Vec<PartitionKey> {
        let mut partitions: Vec<PartitionKey> = self
            .records
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.partition)
            .collect();
        partitions.sort();
        partitions
    }

    /// Records sorted ascending by partition date
    pub fn sorted_records(&self) -> Vec<&StatusRecord> {
        let mut records: Vec<&StatusRecord> = self.records.iter().collect();
        records.sort_by_key(|r| r.partition);
        records
    }

    /// Wraps the ledger for sharing with the shutdown path
    pub fn into_shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> PartitionKey {
        PartitionKey::new(s).unwrap()
    }

    #[test]
    fn test_started_record_has_no_status_field() {
        let mut ledger = StatusLedger::new();
        ledger.mark_started(key("20240101"));

        let json = String::from_utf8(ledger.to_json().unwrap()).unwrap();
        assert!(json.contains("\"export_date_partition\": \"20240101\""));
        assert!(!json.contains("status\":"));
        assert!(!json.contains("bytes"));
    }

    #[test]
    fn test_parse_document() {
        let doc = br#"{"extract_status": [
            {"run_timestamp": "20240106 01:00:00.123", "export_date_partition": "20240105", "status": "success", "bytes": 99},
            {"run_timestamp": "20240106 00:59:00.000", "export_date_partition": "20240104"}
        ]}"#;
        let ledger = StatusLedger::from_json(doc).unwrap();

        assert_eq!(ledger.len(), 2);
        assert!(ledger.is_completed(&key("20240105")));
        assert!(!ledger.is_completed(&key("20240104")));
        assert_eq!(ledger.get(&key("20240105")).unwrap().bytes_written, Some(99));
        assert_eq!(ledger.incomplete_partitions(), vec![key("20240104")]);
    }

    #[test]
    fn test_latest_is_by_date_not_order() {
        let mut ledger = StatusLedger::new();
        ledger.mark_started(key("20241231"));
        ledger.mark_started(key("20240101"));
        ledger.mark_started(key("20250101"));
        ledger.mark_started(key("20240601"));

        assert_eq!(ledger.latest_partition(), Some(key("20250101")));
    }

    #[test]
    fn test_mark_started_is_noop_for_existing() {
        let mut ledger = StatusLedger::new();
        assert!(ledger.mark_started(key("20240101")));
        let stamp = ledger.get(&key("20240101")).unwrap().run_timestamp;
        assert!(!ledger.mark_started(key("20240101")));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&key("20240101")).unwrap().run_timestamp, stamp);
    }

    #[test]
    fn test_success_transition_in_place() {
        let mut ledger = StatusLedger::new();
        ledger.mark_started(key("20240101"));
        ledger.mark_started(key("20240102"));
        ledger.mark_success(&key("20240101"), 512).unwrap();

        let record = ledger.get(&key("20240101")).unwrap();
        assert_eq!(record.status, ExtractStatus::Success);
        assert_eq!(record.bytes_written, Some(512));
        assert_eq!(ledger.records()[1].partition, key("20240101"));
    }

    #[test]
    fn test_mark_success_requires_record() {
        let mut ledger = StatusLedger::new();
        assert!(matches!(
            ledger.mark_success(&key("20240101"), 1),
            Err(ExporterError::Ledger(_))
        ));
    }

    #[test]
    fn test_reset_started_clears_bytes() {
        let mut ledger = StatusLedger::new();
        ledger.mark_started(key("20240101"));
        ledger.mark_success(&key("20240101"), 10).unwrap();
        ledger.reset_started(key("20240101"));

        let record = ledger.get(&key("20240101")).unwrap();
        assert!(record.status.is_started());
        assert_eq!(record.bytes_written, None);
    }

    #[test]
    fn test_duplicates_collapse_preferring_success() {
        let records = vec![
            StatusRecord::started(key("20240101")),
            StatusRecord {
                status: ExtractStatus::Success,
                bytes_written: Some(7),
                ..StatusRecord::started(key("20240101"))
            },
        ];
        let ledger = StatusLedger::from_records(records);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_completed(&key("20240101")));
    }

    #[test]
    fn test_uppercase_status_alias() {
        let doc = br#"{"extract_status": [
            {"run_timestamp": "20240106 01:00:00.000", "export_date_partition": "20240105", "status": "SUCCESS", "bytes": 1}
        ]}"#;
        assert!(StatusLedger::from_json(doc)
            .unwrap()
            .is_completed(&key("20240105")));
    }

    #[test]
    fn test_rejects_bad_partition_key() {
        let doc = br#"{"extract_status": [
            {"run_timestamp": "20240106 01:00:00.000", "export_date_partition": "2024-01-05"}
        ]}"#;
        assert!(StatusLedger::from_json(doc).is_err());
    }
}
