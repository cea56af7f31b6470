//! External system integrations.
//!
//! - [`warehouse`] - Source warehouse seam (partition queries, extract jobs)
//! - [`storage`] - Destination object store seam
//! - [`gcp`] - BigQuery and Cloud Storage REST implementations
//! - [`factory`] - Builds the clients for a configuration
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with in-memory implementations. The export core only sees the
//! [`warehouse::Warehouse`] and [`storage::ObjectStore`] traits.
//!
//! ```rust
//! use billing_exporter::adapters::storage::{InMemoryObjectStore, ObjectStore};
//! use billing_exporter::adapters::warehouse::InMemoryWarehouse;
//! use billing_exporter::domain::PartitionKey;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryObjectStore::new("billing-archive"));
//! let warehouse = InMemoryWarehouse::new(Arc::clone(&store));
//! warehouse.add_partition(PartitionKey::new("20240101").unwrap(), 10);
//! assert_eq!(store.bucket(), "billing-archive");
//! ```

pub mod factory;
pub mod gcp;
pub mod storage;
pub mod warehouse;
