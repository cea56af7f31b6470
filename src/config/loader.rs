//! Configuration loader with environment variable substitution and overrides
//!
//! The exporter configuration is a JSON document read either from a file or
//! from the `exporter-config` attribute of the instance metadata server.

use super::schema::ExporterConfig;
use super::secret_string;
use crate::domain::errors::ExporterError;
use crate::domain::result::Result;
use regex::Regex;
use reqwest::StatusCode;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Instance metadata attribute that carries the exporter configuration
pub const METADATA_CONFIG_ATTRIBUTE: &str = "exporter-config";

/// Default metadata server, overridable with `EXPORTER_GCP_METADATA_ENDPOINT`
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://metadata.google.internal";

/// Loads configuration from a JSON file
///
/// This function:
/// 1. Reads the file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the JSON into ExporterConfig
/// 4. Applies environment variable overrides (EXPORTER_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns a configuration error if any step fails.
///
/// # Examples
///
/// ```no_run
/// use billing_exporter::config::loader::load_config;
///
/// let config = load_config("exporter-config.json").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ExporterConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ExporterError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ExporterError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Loads configuration from the instance metadata server
///
/// # Errors
///
/// Returns a configuration error if the attribute is missing, the server is
/// unreachable, or the document is invalid.
pub async fn load_config_from_metadata(metadata_endpoint: &str) -> Result<ExporterConfig> {
    let url = format!(
        "{}/computeMetadata/v1/instance/attributes/{METADATA_CONFIG_ATTRIBUTE}",
        metadata_endpoint.trim_end_matches('/')
    );

    tracing::info!(url = %url, "Reading exporter configuration from instance metadata");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ExporterError::Configuration(format!("Failed to build HTTP client: {e}")))?;

    let response = client
        .get(&url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| {
            ExporterError::Configuration(format!("Failed to reach metadata server: {e}"))
        })?;

    match response.status() {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => {
            return Err(ExporterError::Configuration(format!(
                "Instance metadata attribute '{METADATA_CONFIG_ATTRIBUTE}' is not set"
            )))
        }
        status => {
            return Err(ExporterError::Configuration(format!(
                "Metadata server returned {status} for '{METADATA_CONFIG_ATTRIBUTE}'"
            )))
        }
    }

    let body = response.text().await.map_err(|e| {
        ExporterError::Configuration(format!("Failed to read metadata response: {e}"))
    })?;

    parse_config(&body)
}

/// Resolves the configuration from `--config_file` or, when absent, from
/// instance metadata
pub async fn resolve_config(config_file: Option<&str>) -> Result<ExporterConfig> {
    match config_file {
        Some(path) => load_config(path),
        None => {
            let endpoint = std::env::var("EXPORTER_GCP_METADATA_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_METADATA_ENDPOINT.to_string());
            load_config_from_metadata(&endpoint).await
        }
    }
}

/// Parses, overrides and validates a configuration document
pub fn parse_config(contents: &str) -> Result<ExporterConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ExporterConfig = serde_json::from_str(&contents)
        .map_err(|e| ExporterError::Configuration(format!("Failed to parse JSON: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ExporterError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ExporterError::Other(format!("Invalid substitution pattern: {e}")))?;
    let mut missing_vars: Vec<String> = Vec::new();

    let result = re.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                if !missing_vars.iter().any(|v| v == var_name) {
                    missing_vars.push(var_name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing_vars.is_empty() {
        return Err(ExporterError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result.into_owned())
}

/// Applies environment variable overrides using the EXPORTER_* prefix
fn apply_env_overrides(config: &mut ExporterConfig) -> Result<()> {
    if let Ok(val) = std::env::var("EXPORTER_SOURCE_PROJECT_ID") {
        config.source_project_id = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_SOURCE_DATASET_ID") {
        config.source_dataset_id = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_SOURCE_TABLE_ID") {
        config.source_table_id = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_DESTINATION_BUCKET") {
        config.destination_bucket = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_LOCATION") {
        config.location = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_STATUS_ROOT") {
        config.status_root = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_EXTRACT_TIMEOUT_SECS") {
        let secs = val.parse().map_err(|_| {
            ExporterError::Configuration(format!(
                "EXPORTER_EXTRACT_TIMEOUT_SECS must be an integer (got '{val}')"
            ))
        })?;
        config.extract_timeout_secs = Some(secs);
    }
    if let Ok(val) = std::env::var("EXPORTER_JOB_POLL_INTERVAL_MS") {
        if let Ok(interval) = val.parse() {
            config.job_poll_interval_ms = interval;
        }
    }

    if let Ok(val) = std::env::var("EXPORTER_GCP_BIGQUERY_ENDPOINT") {
        config.gcp.bigquery_endpoint = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_GCP_STORAGE_ENDPOINT") {
        config.gcp.storage_endpoint = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_GCP_METADATA_ENDPOINT") {
        config.gcp.metadata_endpoint = val;
    }
    if let Ok(val) = std::env::var("EXPORTER_GCP_ACCESS_TOKEN") {
        config.gcp.access_token = Some(secret_string(val));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"{
        "source_project_id": "billing-prj",
        "source_dataset_id": "billing_ds",
        "source_table_id": "gcp_billing_export",
        "destination_bucket": "billing-archive",
        "logger": ["console"]
    }"#;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("LOADER_TEST_BUCKET", "from-env");
        let result = substitute_env_vars(r#"{"destination_bucket": "${LOADER_TEST_BUCKET}"}"#)
            .unwrap();
        assert_eq!(result, r#"{"destination_bucket": "from-env"}"#);
        std::env::remove_var("LOADER_TEST_BUCKET");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("LOADER_TEST_MISSING");
        let result = substitute_env_vars(r#"{"x": "${LOADER_TEST_MISSING}"}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("LOADER_TEST_MISSING"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-exporter-config.json");
        assert!(matches!(result, Err(ExporterError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(VALID.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.source_table_id, "gcp_billing_export");
        assert_eq!(config.destination_bucket, "billing-archive");
        assert_eq!(config.logger, Some(vec!["console".to_string()]));
    }

    #[test]
    fn test_parse_config_rejects_missing_bucket() {
        let result = parse_config(
            r#"{"source_project_id": "p", "source_dataset_id": "d", "source_table_id": "t"}"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("destination_bucket"));
    }

    #[test]
    fn test_parse_config_rejects_malformed_json() {
        let result = parse_config("{ not json");
        assert!(matches!(result, Err(ExporterError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_load_config_from_metadata() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/computeMetadata/v1/instance/attributes/exporter-config",
            )
            .match_header("Metadata-Flavor", "Google")
            .with_status(200)
            .with_body(VALID)
            .create_async()
            .await;

        let config = load_config_from_metadata(&server.url()).await.unwrap();
        assert_eq!(config.source_project_id, "billing-prj");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_load_config_from_metadata_missing_attribute() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                "/computeMetadata/v1/instance/attributes/exporter-config",
            )
            .with_status(404)
            .create_async()
            .await;

        let err = load_config_from_metadata(&server.url()).await.unwrap_err();
        assert!(err.to_string().contains("exporter-config"));
    }
}
