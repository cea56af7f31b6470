//! Partition enumeration
//!
//! Lists the partitions present in the source table. A failed query is
//! fatal for the caller: guessing which partitions exist is not safe.

use crate::adapters::warehouse::{PartitionQuery, Warehouse};
use crate::domain::{DateRange, ExporterError, PartitionKey, Result, TableRef};
use std::sync::Arc;

/// Lists source partitions through the warehouse
pub struct PartitionEnumerator {
    warehouse: Arc<dyn Warehouse>,
    table: TableRef,
}

impl PartitionEnumerator {
    pub fn new(warehouse: Arc<dyn Warehouse>, table: TableRef) -> Self {
        Self { warehouse, table }
    }

    /// Partitions in `range`, ascending
    pub async fn list_partitions(&self, range: DateRange) -> Result<Vec<PartitionKey>> {
        let query = PartitionQuery::in_range(self.table.clone(), range);
        let partitions = self.run(&query).await?;
        Ok(partitions
            .into_iter()
            .filter(|key| range.contains(key))
            .collect())
    }

    /// Every partition ever present in the table, ascending
    pub async fn list_all_partitions(&self) -> Result<Vec<PartitionKey>> {
        self.run(&PartitionQuery::all(self.table.clone())).await
    }

    async fn run(&self, query: &PartitionQuery) -> Result<Vec<PartitionKey>> {
        tracing::debug!(table_id = %self.table.table_id, sql = %query.to_sql(), "Partition query");

        let raw = self.warehouse.distinct_partitions(query).await.map_err(|e| {
            tracing::error!(
                table_id = %self.table.table_id,
                error = %e,
                "Partition query did not execute"
            );
            ExporterError::Enumeration(e.to_string())
        })?;

        let mut partitions = raw
            .iter()
            .map(|value| {
                PartitionKey::new(value).map_err(|e| {
                    ExporterError::Enumeration(format!("unexpected partition value: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Compare as dates, never as strings
        partitions.sort();
        partitions.dedup();

        tracing::info!(
            table_id = %self.table.table_id,
            count = partitions.len(),
            "Enumerated partitions"
        );
        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryObjectStore;
    use crate::adapters::warehouse::InMemoryWarehouse;

    fn key(s: &str) -> PartitionKey {
        PartitionKey::new(s).unwrap()
    }

    fn enumerator() -> (Arc<InMemoryWarehouse>, PartitionEnumerator) {
        let store = Arc::new(InMemoryObjectStore::new("archive"));
        let warehouse = Arc::new(InMemoryWarehouse::new(store));
        for k in ["20231231", "20240101", "20240102", "20240201"] {
            warehouse.add_partition(key(k), 1);
        }
        let enumerator = PartitionEnumerator::new(warehouse.clone(), TableRef::new("p", "d", "t"));
        (warehouse, enumerator)
    }

    #[tokio::test]
    async fn test_list_partitions_in_range_ascending() {
        let (_, enumerator) = enumerator();
        let range = DateRange::new(key("20231231"), key("20240201")).unwrap();
        let partitions = enumerator.list_partitions(range).await.unwrap();
        assert_eq!(
            partitions,
            vec![key("20231231"), key("20240101"), key("20240102")]
        );
    }

    #[tokio::test]
    async fn test_list_all_partitions() {
        let (_, enumerator) = enumerator();
        assert_eq!(enumerator.list_all_partitions().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_query_failure_is_enumeration_error() {
        let (warehouse, enumerator) = enumerator();
        warehouse.fail_queries(true);
        let result = enumerator.list_all_partitions().await;
        assert!(matches!(result, Err(ExporterError::Enumeration(_))));
    }
}
