//! Configuration management for the exporter.
//!
//! The exporter is driven by a small JSON document naming the source table and
//! the destination bucket:
//!
//! ```json
//! {
//!   "source_project_id": "billing-prj",
//!   "source_dataset_id": "billing_ds",
//!   "source_table_id": "gcp_billing_export_v1",
//!   "destination_bucket": "billing-archive",
//!   "logger": ["console", "stackdriver"]
//! }
//! ```
//!
//! The document comes from `--config_file` or, when no file is given, from the
//! `exporter-config` instance metadata attribute. `${VAR_NAME}` placeholders are
//! substituted from the environment and `EXPORTER_*` variables override fields.
//!
//! # Configuration Structure
//!
//! - [`ExporterConfig`] - Source, destination, logging and job settings
//! - [`GcpConfig`] - API endpoints and credentials
//! - [`LoggingConfig`] - Log sinks derived from the `logger` list
//! - [`ExportPaths`] - Local files and object names derived from the table id

pub mod loader;
pub mod paths;
pub mod schema;
pub mod secret;

pub use loader::{load_config, load_config_from_metadata, parse_config, resolve_config};
pub use paths::ExportPaths;
pub use schema::{ExporterConfig, GcpConfig, LoggingConfig};
pub use secret::{secret_string, SecretString, SecretValue};
