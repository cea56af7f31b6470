//! Partition extraction state machine
//!
//! Each partition moves `NOT_STARTED -> STARTED -> SUCCESS`. The started
//! record is durably persisted before the extract job is submitted, so a
//! crash mid-export leaves a record that reconciliation retries. A failed
//! partition stays `STARTED` and the range carries on.

use super::enumerator::PartitionEnumerator;
use super::summary::{ExportError, ExportErrorType, ExportSummary};
use crate::adapters::warehouse::{ExtractRequest, Warehouse};
use crate::config::ExportPaths;
use crate::core::state::{LedgerStore, SharedLedger};
use crate::core::verification::ShardVerifier;
use crate::domain::{DateRange, ExporterError, PartitionKey, Result, TableRef};
use std::sync::Arc;
use std::time::Duration;

/// Result of processing one partition
#[derive(Debug)]
pub enum PartitionOutcome {
    /// Already had a success record
    Skipped,
    /// Exported, verified and recorded
    Succeeded { bytes: u64 },
    /// Left at `STARTED`
    Failed(ExporterError),
}

impl PartitionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PartitionOutcome::Failed(_))
    }
}

/// Settings for the extract jobs
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Processing location of the jobs
    pub location: String,

    /// Upper bound on waiting for one job, `None` waits indefinitely
    pub extract_timeout: Option<Duration>,
}

/// Orchestrates extract jobs, verification and ledger transitions
pub struct ExtractionEngine {
    warehouse: Arc<dyn Warehouse>,
    ledger: SharedLedger,
    ledger_store: Arc<LedgerStore>,
    enumerator: PartitionEnumerator,
    verifier: ShardVerifier,
    paths: ExportPaths,
    table: TableRef,
    settings: EngineSettings,
}

impl ExtractionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        ledger: SharedLedger,
        ledger_store: Arc<LedgerStore>,
        verifier: ShardVerifier,
        paths: ExportPaths,
        table: TableRef,
        settings: EngineSettings,
    ) -> Self {
        let enumerator = PartitionEnumerator::new(Arc::clone(&warehouse), table.clone());
        Self {
            warehouse,
            ledger,
            ledger_store,
            enumerator,
            verifier,
            paths,
            table,
            settings,
        }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn enumerator(&self) -> &PartitionEnumerator {
        &self.enumerator
    }

    pub fn verifier(&self) -> &ShardVerifier {
        &self.verifier
    }

    /// Exports every partition of `range` in ascending order
    ///
    /// # Errors
    ///
    /// Fails only when the partitions cannot be enumerated. Partition
    /// failures are recorded in `summary`.
    pub async fn process_range(&self, range: DateRange, summary: &mut ExportSummary) -> Result<()> {
        tracing::info!(table_id = %self.table.table_id, range = %range, "Processing partition range");
        summary.range = Some(range);

        let partitions = self.enumerator.list_partitions(range).await?;
        summary.partitions_enumerated += partitions.len();

        for partition in partitions {
            let outcome = self.process_partition(partition, false).await;
            self.record_outcome(summary, partition, outcome);
        }
        Ok(())
    }

    /// Runs one partition through the state machine
    ///
    /// With `force` a partition that already succeeded is reset to
    /// `STARTED` and exported again.
    pub async fn process_partition(&self, partition: PartitionKey, force: bool) -> PartitionOutcome {
        {
            let mut ledger = self.ledger.lock().await;
            if ledger.is_completed(&partition) && !force {
                tracing::debug!(
                    table_id = %self.table.table_id,
                    partition = %partition,
                    "Partition already exported, skipping"
                );
                return PartitionOutcome::Skipped;
            }
            if force {
                ledger.reset_started(partition);
            } else {
                ledger.mark_started(partition);
            }
        }

        if let Err(e) = self.ledger_store.persist_shared(&self.ledger).await {
            tracing::error!(
                table_id = %self.table.table_id,
                partition = %partition,
                error = %e,
                "Could not record started partition, extract not submitted"
            );
            return PartitionOutcome::Failed(e);
        }

        match self.export_and_verify(partition).await {
            Ok(bytes) => {
                let marked = self.ledger.lock().await.mark_success(&partition, bytes);
                if let Err(e) = marked {
                    return PartitionOutcome::Failed(e);
                }
                if let Err(e) = self.ledger_store.persist_shared(&self.ledger).await {
                    tracing::error!(
                        table_id = %self.table.table_id,
                        partition = %partition,
                        error = %e,
                        "Could not record successful partition"
                    );
                    return PartitionOutcome::Failed(e);
                }
                tracing::info!(
                    table_id = %self.table.table_id,
                    partition = %partition,
                    bytes = bytes,
                    "Partition exported"
                );
                PartitionOutcome::Succeeded { bytes }
            }
            Err(e) => {
                tracing::error!(
                    table_id = %self.table.table_id,
                    partition = %partition,
                    error = %e,
                    "Partition export failed, record left as started"
                );
                PartitionOutcome::Failed(e)
            }
        }
    }

    /// Submits the extract, waits for it and returns the verified byte total
    async fn export_and_verify(&self, partition: PartitionKey) -> Result<u64> {
        let request = ExtractRequest {
            source: self.table.clone(),
            partition,
            destination_uri: self.paths.destination_uri(&partition),
            location: self.settings.location.clone(),
        };

        let job = self.warehouse.submit_extract(&request).await?;
        let job_id = job.job_id().to_string();
        tracing::debug!(
            table_id = %self.table.table_id,
            partition = %partition,
            job_id = %job_id,
            destination = %request.destination_uri,
            "Waiting for extract job"
        );

        match self.settings.extract_timeout {
            Some(limit) => tokio::time::timeout(limit, job.wait())
                .await
                .map_err(|_| {
                    ExporterError::Timeout(format!(
                        "extract job {job_id} for partition {partition} exceeded {limit:?}"
                    ))
                })??,
            None => job.wait().await?,
        }

        let expected_rows = match self
            .warehouse
            .partition_row_count(&self.table, &partition)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(partition = %partition, error = %e, "Could not read partition row count");
                None
            }
        };

        let report = self.verifier.verify(&partition, expected_rows).await?;
        match report.rows_match() {
            Some(false) => tracing::warn!(
                table_id = %self.table.table_id,
                partition = %partition,
                source_rows = report.expected_rows.unwrap_or_default(),
                exported_lines = report.lines,
                "Exported line count differs from source row count"
            ),
            _ => tracing::debug!(
                table_id = %self.table.table_id,
                partition = %partition,
                source_rows = ?report.expected_rows,
                exported_lines = report.lines,
                "Row count check"
            ),
        }
        if !report.has_shards() {
            tracing::warn!(
                table_id = %self.table.table_id,
                partition = %partition,
                "Extract job succeeded but no shards were found"
            );
        }

        Ok(report.bytes)
    }

    /// Folds a partition outcome into the summary
    pub fn record_outcome(
        &self,
        summary: &mut ExportSummary,
        partition: PartitionKey,
        outcome: PartitionOutcome,
    ) {
        match outcome {
            PartitionOutcome::Skipped => summary.partitions_skipped += 1,
            PartitionOutcome::Succeeded { bytes } => {
                summary.partitions_succeeded += 1;
                summary.bytes_written += bytes;
            }
            PartitionOutcome::Failed(error) => {
                summary.partitions_failed += 1;
                let error_type = match &error {
                    ExporterError::Timeout(_) => ExportErrorType::Timeout,
                    ExporterError::Ledger(_) => ExportErrorType::Ledger,
                    ExporterError::Storage(_) | ExporterError::Io(_) => {
                        ExportErrorType::Verification
                    }
                    ExporterError::Warehouse(_) | ExporterError::Extract { .. } => {
                        ExportErrorType::Extract
                    }
                    _ => ExportErrorType::Unknown,
                };
                summary.add_error(
                    ExportError::new(error_type, error.to_string()).for_partition(partition),
                );
            }
        }
    }
}
