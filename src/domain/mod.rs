//! Domain types for the exporter.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`PartitionKey`], [`TableRef`], [`DateRange`])
//! - **Error types** ([`ExporterError`], [`WarehouseError`], [`StorageError`])
//! - **Result type alias** ([`Result`])
//!
//! Partition keys wrap calendar dates, so `20231231 < 20240101` holds even
//! though nothing else about the key is numeric:
//!
//! ```rust
//! use billing_exporter::domain::PartitionKey;
//! use std::str::FromStr;
//!
//! let a = PartitionKey::from_str("20231231").unwrap();
//! let b = PartitionKey::from_str("20240101").unwrap();
//! assert!(a < b);
//! ```

pub mod errors;
pub mod ids;
pub mod result;

pub use errors::{ExporterError, StorageError, WarehouseError};
pub use ids::{DateRange, PartitionKey, TableRef};
pub use result::Result;
