// Status ledger and its replicas

pub mod ledger;
pub mod store;

pub use ledger::{ExtractStatus, SharedLedger, StatusLedger, StatusRecord};
pub use store::{merge, LedgerStore, MergeOutcome, Replica, ReplicaState};
