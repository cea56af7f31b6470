//! Google Cloud REST adapters
//!
//! - [`auth`] - Access tokens (static or metadata server)
//! - [`bigquery`] - [`BigQueryWarehouse`], the BigQuery API v2 warehouse
//! - [`storage`] - [`GcsObjectStore`], the Cloud Storage JSON API store

pub mod auth;
pub mod bigquery;
pub mod storage;

pub use auth::AccessTokenProvider;
pub use bigquery::{BigQueryExtractJob, BigQueryWarehouse};
pub use storage::GcsObjectStore;
