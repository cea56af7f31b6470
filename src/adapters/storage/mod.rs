//! Destination object store
//!
//! - [`traits`] - The [`ObjectStore`] seam
//! - [`memory`] - In-memory implementation

pub mod memory;
pub mod traits;

pub use memory::InMemoryObjectStore;
pub use traits::{ObjectMeta, ObjectStore};
