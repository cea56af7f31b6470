//! In-memory warehouse
//!
//! Holds a set of partitions with a row count each. Extract jobs write a
//! single newline-delimited JSON shard into an [`InMemoryObjectStore`].
//! Partitions can be made to fail at submission, fail while waiting, or
//! never finish.

use super::traits::{ExtractJob, ExtractRequest, PartitionQuery, Warehouse};
use crate::adapters::storage::{InMemoryObjectStore, ObjectStore};
use crate::domain::{PartitionKey, Result, TableRef, WarehouseError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shard number the in-memory jobs substitute for the URI wildcard
const SHARD_NUMBER: &str = "000000000000";

#[derive(Debug, Default)]
struct Faults {
    failing_submissions: BTreeSet<PartitionKey>,
    failing_jobs: BTreeSet<PartitionKey>,
    hanging_jobs: BTreeSet<PartitionKey>,
    reported_rows: HashMap<PartitionKey, u64>,
}

/// In-memory warehouse exporting into an in-memory bucket
#[derive(Debug)]
pub struct InMemoryWarehouse {
    store: Arc<InMemoryObjectStore>,
    partitions: Mutex<BTreeMap<PartitionKey, u64>>,
    faults: Mutex<Faults>,
    submitted: Mutex<Vec<PartitionKey>>,
    queries: Mutex<Vec<PartitionQuery>>,
    fail_queries: AtomicBool,
    fail_range_queries: AtomicBool,
    job_counter: AtomicU64,
}

impl InMemoryWarehouse {
    pub fn new(store: Arc<InMemoryObjectStore>) -> Self {
        Self {
            store,
            partitions: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
            submitted: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            fail_queries: AtomicBool::new(false),
            fail_range_queries: AtomicBool::new(false),
            job_counter: AtomicU64::new(0),
        }
    }

    /// Adds a partition holding `rows` rows
    pub fn add_partition(&self, key: PartitionKey, rows: u64) {
        lock(&self.partitions).insert(key, rows);
    }

    /// Makes job submission fail for a partition
    pub fn fail_submission(&self, key: PartitionKey) {
        lock(&self.faults).failing_submissions.insert(key);
    }

    /// Makes the job of a partition finish with an error
    pub fn fail_job(&self, key: PartitionKey) {
        lock(&self.faults).failing_jobs.insert(key);
    }

    /// Makes the job of a partition never finish
    pub fn hang_job(&self, key: PartitionKey) {
        lock(&self.faults).hanging_jobs.insert(key);
    }

    /// Reports a row count that differs from what the job exports
    pub fn report_row_count(&self, key: PartitionKey, rows: u64) {
        lock(&self.faults).reported_rows.insert(key, rows);
    }

    /// Makes every partition query fail
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Makes only range-bounded partition queries fail
    pub fn fail_range_queries(&self, fail: bool) {
        self.fail_range_queries.store(fail, Ordering::SeqCst);
    }

    /// Removes all injected faults
    pub fn clear_faults(&self) {
        *lock(&self.faults) = Faults::default();
        self.fail_queries.store(false, Ordering::SeqCst);
        self.fail_range_queries.store(false, Ordering::SeqCst);
    }

    /// Partitions an extract was submitted for, in submission order
    pub fn submitted(&self) -> Vec<PartitionKey> {
        lock(&self.submitted).clone()
    }

    /// Number of submissions for one partition
    pub fn submissions_for(&self, key: &PartitionKey) -> usize {
        lock(&self.submitted).iter().filter(|k| *k == key).count()
    }

    /// Partition queries received, in order
    pub fn queries(&self) -> Vec<PartitionQuery> {
        lock(&self.queries).clone()
    }

    /// Object name the job for `uri` writes its single shard to
    fn shard_object(&self, uri: &str) -> Result<String> {
        let prefix = format!("gs://{}/", self.store.bucket());
        let path = uri.strip_prefix(&prefix).ok_or_else(|| {
            WarehouseError::JobSubmissionFailed(format!(
                "destination {uri} is outside bucket {}",
                self.store.bucket()
            ))
        })?;
        Ok(path.replacen('*', SHARD_NUMBER, 1))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Succeed,
    Fail,
    Hang,
}

struct InMemoryExtractJob {
    job_id: String,
    partition: PartitionKey,
    outcome: JobOutcome,
    rows: u64,
    object: String,
    store: Arc<InMemoryObjectStore>,
}

#[async_trait]
impl ExtractJob for InMemoryExtractJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn wait(self: Box<Self>) -> Result<()> {
        match self.outcome {
            JobOutcome::Hang => std::future::pending::<Result<()>>().await,
            JobOutcome::Fail => Err(WarehouseError::JobFailed {
                job_id: self.job_id.clone(),
                message: format!("extract of partition {} failed", self.partition),
            }
            .into()),
            JobOutcome::Succeed => {
                let body: String = (0..self.rows)
                    .map(|i| format!("{{\"row\":{i},\"partition\":\"{}\"}}\n", self.partition))
                    .collect();
                self.store.write_object(&self.object, body.into_bytes()).await
            }
        }
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn distinct_partitions(&self, query: &PartitionQuery) -> Result<Vec<String>> {
        lock(&self.queries).push(query.clone());
        if self.fail_queries.load(Ordering::SeqCst)
            || (query.range.is_some() && self.fail_range_queries.load(Ordering::SeqCst))
        {
            return Err(WarehouseError::QueryFailed("injected query failure".to_string()).into());
        }

        Ok(lock(&self.partitions)
            .keys()
            .filter(|key| query.range.as_ref().map_or(true, |r| r.contains(key)))
            .map(|key| key.as_str())
            .collect())
    }

    async fn submit_extract(&self, request: &ExtractRequest) -> Result<Box<dyn ExtractJob>> {
        lock(&self.submitted).push(request.partition);

        let outcome = {
            let faults = lock(&self.faults);
            if faults.failing_submissions.contains(&request.partition) {
                return Err(WarehouseError::JobSubmissionFailed(format!(
                    "injected submission failure for {}",
                    request.partition
                ))
                .into());
            }
            if faults.hanging_jobs.contains(&request.partition) {
                JobOutcome::Hang
            } else if faults.failing_jobs.contains(&request.partition) {
                JobOutcome::Fail
            } else {
                JobOutcome::Succeed
            }
        };

        let rows = lock(&self.partitions)
            .get(&request.partition)
            .copied()
            .ok_or_else(|| {
                WarehouseError::TableNotFound(request.source.partition_decorator(&request.partition))
            })?;

        let n = self.job_counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryExtractJob {
            job_id: format!("job_memory_{n}"),
            partition: request.partition,
            outcome,
            rows,
            object: self.shard_object(&request.destination_uri)?,
            store: Arc::clone(&self.store),
        }))
    }

    async fn partition_row_count(
        &self,
        _table: &TableRef,
        partition: &PartitionKey,
    ) -> Result<Option<u64>> {
        if let Some(rows) = lock(&self.faults).reported_rows.get(partition) {
            return Ok(Some(*rows));
        }
        Ok(lock(&self.partitions).get(partition).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DateRange;

    fn key(s: &str) -> PartitionKey {
        PartitionKey::new(s).unwrap()
    }

    fn setup() -> (Arc<InMemoryObjectStore>, InMemoryWarehouse) {
        let store = Arc::new(InMemoryObjectStore::new("archive"));
        let warehouse = InMemoryWarehouse::new(Arc::clone(&store));
        for (k, rows) in [("20240101", 2), ("20240102", 3), ("20240201", 1)] {
            warehouse.add_partition(key(k), rows);
        }
        (store, warehouse)
    }

    fn request(k: &str) -> ExtractRequest {
        ExtractRequest {
            source: TableRef::new("p", "d", "t"),
            partition: key(k),
            destination_uri: format!("gs://archive/t/{k}/billing-export-*.json"),
            location: "US".to_string(),
        }
    }

    #[tokio::test]
    async fn test_range_filter() {
        let (_, warehouse) = setup();
        let range = DateRange::new(key("20240101"), key("20240201")).unwrap();
        let parts = warehouse
            .distinct_partitions(&PartitionQuery::in_range(TableRef::new("p", "d", "t"), range))
            .await
            .unwrap();
        assert_eq!(parts, vec!["20240101", "20240102"]);
    }

    #[tokio::test]
    async fn test_job_writes_shard() {
        let (store, warehouse) = setup();
        let job = warehouse.submit_extract(&request("20240102")).await.unwrap();
        job.wait().await.unwrap();

        let shard = store
            .get("t/20240102/billing-export-000000000000.json")
            .unwrap();
        assert_eq!(String::from_utf8(shard).unwrap().lines().count(), 3);
        assert_eq!(warehouse.submissions_for(&key("20240102")), 1);
    }

    #[tokio::test]
    async fn test_failing_job() {
        let (store, warehouse) = setup();
        warehouse.fail_job(key("20240101"));
        let job = warehouse.submit_extract(&request("20240101")).await.unwrap();
        assert!(job.wait().await.is_err());
        assert!(store.names().is_empty());
    }

    #[tokio::test]
    async fn test_failing_query() {
        let (_, warehouse) = setup();
        warehouse.fail_queries(true);
        let result = warehouse
            .distinct_partitions(&PartitionQuery::all(TableRef::new("p", "d", "t")))
            .await;
        assert!(result.is_err());
    }
}
