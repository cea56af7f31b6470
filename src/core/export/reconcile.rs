//! Reconciliation of incomplete partitions
//!
//! Runs after a delta run's main range. The first sub-pass re-enumerates the
//! one-day range of every ledger record that is not a success and retries
//! the partitions still present in the source. The second lists every partition the
//! source table has ever had and re-exports those whose destination has no
//! shards, whose ledger entry is not a success, or whose recorded byte total
//! differs from the listed one.

use super::engine::{ExtractionEngine, PartitionOutcome};
use super::summary::{ExportError, ExportErrorType, ExportSummary};
use crate::domain::{DateRange, PartitionKey};
use std::collections::BTreeSet;

/// Why a partition is re-exported in the second sub-pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReexportReason {
    NoShards,
    NotRecorded,
    NotCompleted,
    ByteMismatch { recorded: u64, listed: u64 },
}

/// Sweep over partitions lacking a verified success
pub struct ReconciliationPass<'a> {
    engine: &'a ExtractionEngine,
}

impl<'a> ReconciliationPass<'a> {
    pub fn new(engine: &'a ExtractionEngine) -> Self {
        Self { engine }
    }

    /// Runs both sub-passes
    ///
    /// Failures are recorded in `summary`; a partition is attempted at most
    /// once per call.
    pub async fn reconcile(&self, summary: &mut ExportSummary) {
        tracing::info!("Re-run of failed partitions started");
        let attempted = self.retry_incomplete(summary).await;
        self.sweep_all_partitions(&attempted, summary).await;
        tracing::info!("Re-run of failed partitions completed");
    }

    /// Re-runs every incomplete record over its one-day range
    ///
    /// A record whose partition is no longer in the source is left alone.
    /// A failed partition query ends this sub-pass.
    async fn retry_incomplete(&self, summary: &mut ExportSummary) -> BTreeSet<PartitionKey> {
        let incomplete = self.engine.ledger().lock().await.incomplete_partitions();
        let mut attempted = BTreeSet::new();

        for partition in incomplete {
            let day = DateRange::single_day(partition);
            let present = match self.engine.enumerator().list_partitions(day).await {
                Ok(partitions) => partitions.contains(&partition),
                Err(e) => {
                    tracing::error!(
                        partition = %partition,
                        error = %e,
                        "Partition query failed, retry of incomplete partitions stopped"
                    );
                    summary.add_error(
                        ExportError::new(ExportErrorType::Enumeration, e.to_string())
                            .for_partition(partition),
                    );
                    break;
                }
            };

            if !present {
                tracing::warn!(
                    partition = %partition,
                    "Incomplete partition no longer in source table, not retried"
                );
                continue;
            }

            tracing::info!(partition = %partition, "Retrying partition without success record");
            attempted.insert(partition);
            let outcome = self.engine.process_partition(partition, false).await;
            self.record(summary, partition, outcome);
        }
        attempted
    }

    async fn sweep_all_partitions(
        &self,
        attempted: &BTreeSet<PartitionKey>,
        summary: &mut ExportSummary,
    ) {
        let partitions = match self.engine.enumerator().list_all_partitions().await {
            Ok(partitions) => partitions,
            Err(e) => {
                summary.add_error(ExportError::new(ExportErrorType::Enumeration, e.to_string()));
                return;
            }
        };

        for partition in partitions {
            if attempted.contains(&partition) {
                continue;
            }

            let reason = match self.reexport_reason(partition).await {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::error!(
                        partition = %partition,
                        error = %e,
                        "Could not inspect exported shards"
                    );
                    summary.add_error(
                        ExportError::new(ExportErrorType::Verification, e.to_string())
                            .for_partition(partition),
                    );
                    continue;
                }
            };

            let Some(reason) = reason else {
                continue;
            };

            let force = matches!(reason, ReexportReason::ByteMismatch { .. } | ReexportReason::NoShards)
                && self.engine.ledger().lock().await.is_completed(&partition);
            tracing::info!(partition = %partition, reason = ?reason, "Re-exporting partition");
            let outcome = self.engine.process_partition(partition, force).await;
            self.record(summary, partition, outcome);
        }
    }

    /// Whether a partition needs a fresh export, and why
    pub async fn reexport_reason(
        &self,
        partition: PartitionKey,
    ) -> crate::domain::Result<Option<ReexportReason>> {
        let (shards, listed) = self.engine.verifier().destination_totals(&partition).await?;
        let record = self.engine.ledger().lock().await.get(&partition).cloned();

        tracing::debug!(
            partition = %partition,
            shards = shards,
            listed_bytes = listed,
            recorded_bytes = ?record.as_ref().and_then(|r| r.bytes_written),
            "Destination check"
        );

        if shards == 0 {
            return Ok(Some(ReexportReason::NoShards));
        }
        let Some(record) = record else {
            return Ok(Some(ReexportReason::NotRecorded));
        };
        if !record.is_success() {
            return Ok(Some(ReexportReason::NotCompleted));
        }
        match record.bytes_written {
            Some(recorded) if recorded == listed => Ok(None),
            recorded => {
                tracing::warn!(
                    partition = %partition,
                    recorded_bytes = ?recorded,
                    listed_bytes = listed,
                    "Recorded bytes differ from destination"
                );
                Ok(Some(ReexportReason::ByteMismatch {
                    recorded: recorded.unwrap_or_default(),
                    listed,
                }))
            }
        }
    }

    fn record(&self, summary: &mut ExportSummary, partition: PartitionKey, outcome: PartitionOutcome) {
        if !matches!(outcome, PartitionOutcome::Skipped) {
            summary.partitions_reconciled += 1;
        }
        self.engine.record_outcome(summary, partition, outcome);
    }
}
