//! In-memory object store
//!
//! Keeps objects in a sorted map and records every write. Used by the test
//! suites and by anything embedding the engine without a real bucket.
//! Reads and writes can be made to fail per name prefix.

use super::traits::{ObjectMeta, ObjectStore};
use crate::domain::{Result, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// In-memory object store bound to one bucket
#[derive(Debug)]
pub struct InMemoryObjectStore {
    bucket: String,
    bucket_exists: AtomicBool,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    write_counts: Mutex<HashMap<String, usize>>,
    failing_reads: Mutex<Vec<String>>,
    failing_writes: Mutex<Vec<String>>,
}

impl InMemoryObjectStore {
    /// Creates an empty, existing bucket
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            bucket_exists: AtomicBool::new(true),
            objects: Mutex::new(BTreeMap::new()),
            write_counts: Mutex::new(HashMap::new()),
            failing_reads: Mutex::new(Vec::new()),
            failing_writes: Mutex::new(Vec::new()),
        }
    }

    /// Creates a store whose bucket does not exist
    pub fn missing(bucket: impl Into<String>) -> Self {
        let store = Self::new(bucket);
        store.bucket_exists.store(false, Ordering::SeqCst);
        store
    }

    /// Stores an object without counting it as a write
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(name.into(), data.into());
    }

    /// Removes an object
    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        lock(&self.objects).remove(name)
    }

    /// Current content of an object
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(name).cloned()
    }

    /// Names of all stored objects in sorted order
    pub fn names(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// How many times `write_object` stored the given name
    pub fn write_count(&self, name: &str) -> usize {
        lock(&self.write_counts).get(name).copied().unwrap_or(0)
    }

    /// Makes reads of names starting with `prefix` fail
    pub fn fail_reads_with_prefix(&self, prefix: impl Into<String>) {
        lock(&self.failing_reads).push(prefix.into());
    }

    /// Makes writes of names starting with `prefix` fail
    pub fn fail_writes_with_prefix(&self, prefix: impl Into<String>) {
        lock(&self.failing_writes).push(prefix.into());
    }

    /// Clears all injected failures
    pub fn clear_failures(&self) {
        lock(&self.failing_reads).clear();
        lock(&self.failing_writes).clear();
    }

    fn read_fails(&self, name: &str) -> bool {
        lock(&self.failing_reads)
            .iter()
            .any(|p| name.starts_with(p.as_str()))
    }

    fn write_fails(&self, name: &str) -> bool {
        lock(&self.failing_writes)
            .iter()
            .any(|p| name.starts_with(p.as_str()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.bucket_exists.load(Ordering::SeqCst))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        if self.read_fails(prefix) {
            return Err(StorageError::ConnectionFailed(format!("injected list failure: {prefix}")).into());
        }
        Ok(lock(&self.objects)
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, data)| ObjectMeta {
                name: name.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    async fn read_object(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if self.read_fails(name) {
            return Err(StorageError::ConnectionFailed(format!("injected read failure: {name}")).into());
        }
        Ok(lock(&self.objects).get(name).cloned())
    }

    async fn write_object(&self, name: &str, data: Vec<u8>) -> Result<()> {
        if self.write_fails(name) {
            return Err(StorageError::WriteFailed {
                name: name.to_string(),
                message: "injected write failure".to_string(),
            }
            .into());
        }
        lock(&self.objects).insert(name.to_string(), data);
        *lock(&self.write_counts).entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn object_exists(&self, name: &str) -> Result<bool> {
        if self.read_fails(name) {
            return Err(StorageError::ConnectionFailed(format!("injected read failure: {name}")).into());
        }
        Ok(lock(&self.objects).contains_key(name))
    }
}
