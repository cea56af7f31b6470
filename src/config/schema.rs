//! Configuration schema types
//!
//! This module defines the exporter configuration document. The four source and
//! destination identifiers are mandatory; everything else has a default.

use crate::config::paths::ExportPaths;
use crate::config::SecretString;
use crate::domain::TableRef;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Log sink names accepted in the `logger` list
pub const LOGGER_CONSOLE: &str = "console";
pub const LOGGER_STACKDRIVER: &str = "stackdriver";

/// Main exporter configuration
///
/// Maps to the JSON document supplied with `--config_file` or through the
/// `exporter-config` instance metadata attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Project that owns the source table
    #[serde(default)]
    pub source_project_id: String,

    /// Dataset holding the source table
    #[serde(default)]
    pub source_dataset_id: String,

    /// Day-partitioned source table
    #[serde(default)]
    pub source_table_id: String,

    /// Destination bucket for exported shards, ledger and run log
    #[serde(default)]
    pub destination_bucket: String,

    /// Enabled log sinks ("console", "stackdriver"); absent enables both
    #[serde(default)]
    pub logger: Option<Vec<String>>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Location the warehouse jobs run in; must match the source table
    #[serde(default = "default_location")]
    pub location: String,

    /// Local directory under which `<table>/process_status/` is kept
    #[serde(default = "default_status_root")]
    pub status_root: String,

    /// Upper bound on a single extract job wait; absent waits without limit
    #[serde(default)]
    pub extract_timeout_secs: Option<u64>,

    /// Poll interval while waiting for warehouse jobs
    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,

    /// Google Cloud endpoints and credentials
    #[serde(default)]
    pub gcp: GcpConfig,
}

impl ExporterConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error naming every missing mandatory value, or the first
    /// invalid optional value.
    pub fn validate(&self) -> Result<(), String> {
        let missing: Vec<&str> = [
            ("source_project_id", &self.source_project_id),
            ("source_dataset_id", &self.source_dataset_id),
            ("source_table_id", &self.source_table_id),
            ("destination_bucket", &self.destination_bucket),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(format!(
                "Missing required configuration values: {}",
                missing.join(", ")
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        if let Some(sinks) = &self.logger {
            for sink in sinks {
                if sink != LOGGER_CONSOLE && sink != LOGGER_STACKDRIVER {
                    return Err(format!(
                        "Invalid logger '{sink}'. Must be one of: {LOGGER_CONSOLE}, {LOGGER_STACKDRIVER}"
                    ));
                }
            }
        }

        if self.location.trim().is_empty() {
            return Err("location cannot be empty".to_string());
        }

        if self.extract_timeout_secs == Some(0) {
            return Err("extract_timeout_secs must be > 0 when set".to_string());
        }

        if self.job_poll_interval_ms == 0 {
            return Err("job_poll_interval_ms must be > 0".to_string());
        }

        self.gcp.validate()
    }

    /// Source table reference
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(
            &self.source_project_id,
            &self.source_dataset_id,
            &self.source_table_id,
        )
    }

    /// Local and remote locations derived from the table and bucket
    pub fn paths(&self) -> ExportPaths {
        ExportPaths::new(
            PathBuf::from(&self.status_root),
            &self.source_table_id,
            &self.destination_bucket,
        )
    }

    /// Logging settings derived from the `logger` list
    pub fn logging(&self) -> LoggingConfig {
        let enabled = |name: &str| {
            self.logger
                .as_ref()
                .map_or(true, |sinks| sinks.iter().any(|s| s == name))
        };

        LoggingConfig {
            console_enabled: enabled(LOGGER_CONSOLE),
            stackdriver_enabled: enabled(LOGGER_STACKDRIVER),
            log_file: Some(self.paths().local_log_file()),
        }
    }

    /// Extract job wait limit
    pub fn extract_timeout(&self) -> Option<Duration> {
        self.extract_timeout_secs.map(Duration::from_secs)
    }

    /// Warehouse job poll interval
    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }
}

/// Google Cloud endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    /// BigQuery REST base URL
    #[serde(default = "default_bigquery_endpoint")]
    pub bigquery_endpoint: String,

    /// Cloud Storage JSON API base URL
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,

    /// Instance metadata server base URL
    #[serde(default = "default_metadata_endpoint")]
    pub metadata_endpoint: String,

    /// Static OAuth access token; when absent the metadata server token is used
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub access_token: Option<SecretString>,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            bigquery_endpoint: default_bigquery_endpoint(),
            storage_endpoint: default_storage_endpoint(),
            metadata_endpoint: default_metadata_endpoint(),
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GcpConfig {
    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("gcp.bigquery_endpoint", &self.bigquery_endpoint),
            ("gcp.storage_endpoint", &self.storage_endpoint),
            ("gcp.metadata_endpoint", &self.metadata_endpoint),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(format!(
                    "{name} must start with http:// or https:// (got '{value}')"
                ));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err("gcp.request_timeout_secs must be > 0".to_string());
        }

        Ok(())
    }

    /// HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Human-readable output on stderr
    pub console_enabled: bool,

    /// JSON output on stdout for the cloud logging agent
    pub stackdriver_enabled: bool,

    /// Run log appended for the whole process and uploaded at shutdown
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Console output only, for commands that run before a table is known
    pub fn console_only() -> Self {
        Self {
            console_enabled: true,
            stackdriver_enabled: false,
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_location() -> String {
    "US".to_string()
}

fn default_status_root() -> String {
    ".".to_string()
}

fn default_job_poll_interval_ms() -> u64 {
    1000
}

fn default_bigquery_endpoint() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_storage_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_metadata_endpoint() -> String {
    "http://metadata.google.internal".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}
