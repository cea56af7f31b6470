//! Export summary and reporting
//!
//! This module defines structures for tracking and reporting export results.

use crate::domain::{DateRange, PartitionKey};
use std::time::Duration;

/// Summary of an export run
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Range the main pass covered
    pub range: Option<DateRange>,

    /// Partitions the warehouse reported in range
    pub partitions_enumerated: usize,

    /// Partitions skipped because they already had a success record
    pub partitions_skipped: usize,

    /// Partitions exported and verified
    pub partitions_succeeded: usize,

    /// Partitions whose export failed
    pub partitions_failed: usize,

    /// Partitions re-attempted by reconciliation
    pub partitions_reconciled: usize,

    /// Total bytes written by successful exports
    pub bytes_written: u64,

    /// Duration of the run
    pub duration: Duration,

    /// Errors encountered during the run
    pub errors: Vec<ExportError>,

    /// Whether a termination signal stopped the run
    pub interrupted: bool,

    /// Reason for interruption, if any
    pub interruption_reason: Option<String>,
}

impl ExportSummary {
    /// Create a new empty export summary
    pub fn new() -> Self {
        Self {
            range: None,
            partitions_enumerated: 0,
            partitions_skipped: 0,
            partitions_succeeded: 0,
            partitions_failed: 0,
            partitions_reconciled: 0,
            bytes_written: 0,
            duration: Duration::from_secs(0),
            errors: Vec::new(),
            interrupted: false,
            interruption_reason: None,
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Add an error
    pub fn add_error(&mut self, error: ExportError) {
        self.errors.push(error);
    }

    /// Mark the run as stopped by a signal
    pub fn mark_interrupted(&mut self, reason: impl Into<String>) {
        self.interrupted = true;
        self.interruption_reason = Some(reason.into());
    }

    /// Check if the run was successful (no failures)
    pub fn is_successful(&self) -> bool {
        self.partitions_failed == 0 && self.errors.is_empty()
    }

    /// Get success rate over attempted partitions as a percentage
    pub fn success_rate(&self) -> f64 {
        let attempted = self.partitions_succeeded + self.partitions_failed;
        if attempted == 0 {
            return 100.0;
        }
        (self.partitions_succeeded as f64 / attempted as f64) * 100.0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            range = %self.range.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
            enumerated = self.partitions_enumerated,
            skipped = self.partitions_skipped,
            succeeded = self.partitions_succeeded,
            failed = self.partitions_failed,
            reconciled = self.partitions_reconciled,
            bytes = self.bytes_written,
            duration_secs = self.duration.as_secs(),
            success_rate = format!("{:.2}%", self.success_rate()),
            "Export completed"
        );

        if self.interrupted {
            tracing::warn!(
                reason = %self.interruption_reason.as_deref().unwrap_or("unknown"),
                "Export was interrupted"
            );
        }

        if !self.errors.is_empty() {
            tracing::warn!(
                error_count = self.errors.len(),
                "Export completed with errors"
            );
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    partition = %error.partition.map(|p| p.to_string()).unwrap_or_default(),
                    message = %error.message,
                    "Export error"
                );
            }
        }
    }
}

impl Default for ExportSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Type of export error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportErrorType {
    /// Extract job could not be submitted or failed
    Extract,
    /// Extract job exceeded the configured wait
    Timeout,
    /// Listing or reading the exported shards failed
    Verification,
    /// Ledger could not be persisted
    Ledger,
    /// Partition enumeration failed
    Enumeration,
    /// Unknown error
    Unknown,
}

/// Export error with context
#[derive(Debug, Clone)]
pub struct ExportError {
    /// Type of error
    pub error_type: ExportErrorType,

    /// Error message
    pub message: String,

    /// Partition the error belongs to, if any
    pub partition: Option<PartitionKey>,
}

impl ExportError {
    /// Create a new export error
    pub fn new(error_type: ExportErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            partition: None,
        }
    }

    /// Attach the partition the error belongs to
    pub fn for_partition(mut self, partition: PartitionKey) -> Self {
        self.partition = Some(partition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_summary_creation() {
        let summary = ExportSummary::new();

        assert_eq!(summary.partitions_enumerated, 0);
        assert_eq!(summary.partitions_succeeded, 0);
        assert_eq!(summary.partitions_failed, 0);
        assert_eq!(summary.bytes_written, 0);
        assert_eq!(summary.duration, Duration::from_secs(0));
        assert!(summary.errors.is_empty());
        assert!(!summary.interrupted);
    }

    #[test]
    fn test_export_summary_with_duration() {
        let summary = ExportSummary::new().with_duration(Duration::from_secs(120));

        assert_eq!(summary.duration, Duration::from_secs(120));
    }

    #[test]
    fn test_export_summary_is_successful() {
        let mut summary = ExportSummary::new();
        summary.partitions_succeeded = 3;
        assert!(summary.is_successful());

        summary.partitions_failed = 1;
        assert!(!summary.is_successful());
        assert_eq!(summary.success_rate(), 75.0);
    }

    #[test]
    fn test_export_error_partition_context() {
        let partition = PartitionKey::new("20240110").unwrap();
        let error = ExportError::new(ExportErrorType::Extract, "job failed".to_string())
            .for_partition(partition);

        assert_eq!(error.partition, Some(partition));
        assert_eq!(error.error_type, ExportErrorType::Extract);
    }

    #[test]
    fn test_mark_interrupted() {
        let mut summary = ExportSummary::new();
        summary.mark_interrupted("SIGTERM");
        assert!(summary.interrupted);
        assert_eq!(summary.interruption_reason.as_deref(), Some("SIGTERM"));
    }
}
