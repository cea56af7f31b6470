//! Source data warehouse
//!
//! - [`traits`] - The [`Warehouse`] and [`ExtractJob`] seams
//! - [`memory`] - In-memory implementation

pub mod memory;
pub mod traits;

pub use memory::InMemoryWarehouse;
pub use traits::{ExtractJob, ExtractRequest, PartitionQuery, Warehouse};
