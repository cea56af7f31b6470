//! Data warehouse abstraction
//!
//! The exporter asks the warehouse three things: which partitions exist,
//! to extract one partition to the object store, and how many rows a
//! partition holds.

use crate::domain::{DateRange, PartitionKey, Result, TableRef};
use async_trait::async_trait;

/// Distinct-partition query against the source table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionQuery {
    /// Table to enumerate
    pub table: TableRef,

    /// End-exclusive range; `None` lists every partition
    pub range: Option<DateRange>,
}

impl PartitionQuery {
    pub fn in_range(table: TableRef, range: DateRange) -> Self {
        Self {
            table,
            range: Some(range),
        }
    }

    pub fn all(table: TableRef) -> Self {
        Self { table, range: None }
    }

    /// Standard SQL selecting the distinct `YYYYMMDD` partition dates
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT DISTINCT FORMAT_DATE('%Y%m%d', _PARTITIONDATE) AS parts\nFROM `{}`",
            self.table
        );
        if let Some(range) = &self.range {
            sql.push_str(&format!(
                "\nWHERE FORMAT_DATE('%Y%m%d', _PARTITIONDATE) >= \"{}\"\n  AND FORMAT_DATE('%Y%m%d', _PARTITIONDATE) < \"{}\"",
                range.start, range.end
            ));
        }
        sql.push_str("\nORDER BY parts ASC");
        sql
    }
}

/// Request to extract one partition as newline-delimited JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub source: TableRef,
    pub partition: PartitionKey,

    /// Wildcard `gs://` URI the shards are written to
    pub destination_uri: String,

    /// Processing location of the job
    pub location: String,
}

/// A submitted extract job
#[async_trait]
pub trait ExtractJob: Send {
    /// Warehouse-assigned job identifier
    fn job_id(&self) -> &str;

    /// Blocks until the job finishes, failing if the job failed
    async fn wait(self: Box<Self>) -> Result<()>;
}

/// Query and extract API of the source warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Runs a distinct-partition query and returns the raw `YYYYMMDD` values
    async fn distinct_partitions(&self, query: &PartitionQuery) -> Result<Vec<String>>;

    /// Submits an extract job for one partition
    async fn submit_extract(&self, request: &ExtractRequest) -> Result<Box<dyn ExtractJob>>;

    /// Row count of a single partition, if the warehouse reports one
    async fn partition_row_count(
        &self,
        table: &TableRef,
        partition: &PartitionKey,
    ) -> Result<Option<u64>>;
}
