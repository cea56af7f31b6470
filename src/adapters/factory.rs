//! Client factory
//!
//! Builds the warehouse and object store clients for a validated
//! configuration. Both share one access token provider.

use crate::adapters::gcp::{AccessTokenProvider, BigQueryWarehouse, GcsObjectStore};
use crate::adapters::storage::ObjectStore;
use crate::adapters::warehouse::Warehouse;
use crate::config::ExporterConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Warehouse and object store used by one export run
pub struct Clients {
    pub warehouse: Arc<dyn Warehouse>,
    pub store: Arc<dyn ObjectStore>,
}

/// Create the BigQuery and Cloud Storage clients for the configuration
///
/// Jobs run in the source project at the configured location. The object
/// store is bound to the destination bucket.
///
/// # Errors
///
/// Returns an error if an endpoint is invalid or an HTTP client cannot be built.
pub fn create_clients(config: &ExporterConfig) -> Result<Clients> {
    let auth = Arc::new(AccessTokenProvider::new(&config.gcp)?);

    tracing::info!(
        project = %config.source_project_id,
        location = %config.location,
        "Creating BigQuery client"
    );
    let warehouse = BigQueryWarehouse::new(
        &config.source_project_id,
        &config.location,
        &config.gcp,
        Arc::clone(&auth),
        config.job_poll_interval(),
    )?;

    tracing::info!(bucket = %config.destination_bucket, "Creating Cloud Storage client");
    let store = GcsObjectStore::new(&config.destination_bucket, &config.gcp, auth)?;

    Ok(Clients {
        warehouse: Arc::new(warehouse),
        store: Arc::new(store),
    })
}
