//! Object store abstraction
//!
//! The exporter needs only a handful of blob operations against a single
//! destination bucket. Implementations must be safe to share across tasks.

use crate::domain::Result;
use async_trait::async_trait;
use std::path::Path;

/// Name and size of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Full object name within the bucket
    pub name: String,

    /// Object size in bytes
    pub size: u64,
}

/// Blob API of the destination bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store is bound to
    fn bucket(&self) -> &str;

    /// Whether the bucket exists and is reachable
    async fn bucket_exists(&self) -> Result<bool>;

    /// Lists every object whose name starts with `prefix`
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Reads an object, returning `None` when it does not exist
    async fn read_object(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Writes an object, fully replacing any previous content
    async fn write_object(&self, name: &str, data: Vec<u8>) -> Result<()>;

    /// Whether an object exists
    async fn object_exists(&self, name: &str) -> Result<bool>;

    /// Downloads an object into a local file, returning the bytes written
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ObjectNotFound` when the object is missing.
    async fn download_to_file(&self, name: &str, path: &Path) -> Result<u64> {
        let data = self.read_object(name).await?.ok_or_else(|| {
            crate::domain::StorageError::ObjectNotFound(format!("{}/{}", self.bucket(), name))
        })?;
        tokio::fs::write(path, &data).await?;
        Ok(data.len() as u64)
    }

    /// Uploads a local file as an object
    async fn upload_file(&self, name: &str, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        self.write_object(name, data).await
    }
}
