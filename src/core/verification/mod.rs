//! Post-export verification
//!
//! Checks what an extract job actually wrote to the destination: shard count,
//! byte total and line count, independently of the ledger's bookkeeping.

pub mod report;
pub mod verify;

pub use report::PartitionVerification;
pub use verify::ShardVerifier;
