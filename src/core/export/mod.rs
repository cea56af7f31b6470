//! Export orchestration
//!
//! This module provides the core export logic:
//! - Date range resolution for explicit, historical and delta runs
//! - Partition enumeration and the per-partition extraction state machine
//! - Reconciliation of partitions without a verified success
//! - Shutdown flush, coordination and the run summary

pub mod coordinator;
pub mod engine;
pub mod enumerator;
pub mod range;
pub mod reconcile;
pub mod shutdown;
pub mod summary;

pub use coordinator::ExportCoordinator;
pub use engine::{EngineSettings, ExtractionEngine, PartitionOutcome};
pub use enumerator::PartitionEnumerator;
pub use range::RunMode;
pub use reconcile::{ReconciliationPass, ReexportReason};
pub use shutdown::{wait_for_shutdown, FlushReport, ShutdownHandler};
pub use summary::{ExportError, ExportErrorType, ExportSummary};
