//! Validate config command implementation
//!
//! Loads the configuration the same way an export would and prints what the
//! exporter would use, without contacting Google Cloud.

use super::exit_code;
use crate::config::{resolve_config, ExporterConfig};
use secrecy::ExposeSecret;

/// Execute the validate-config command
pub async fn execute(config_file: Option<&str>) -> anyhow::Result<i32> {
    let source = config_file.unwrap_or("instance metadata");
    tracing::info!(source = %source, "Validating configuration");

    println!("Validating configuration from {source}");
    println!();

    match resolve_config(config_file).await {
        Ok(config) => {
            println!("Configuration is valid");
            println!();
            print!("{}", render_config(&config));
            Ok(exit_code::SUCCESS)
        }
        Err(e) => {
            println!("Configuration validation failed");
            println!("   Error: {e}");
            println!();
            Ok(exit_code::CONFIGURATION)
        }
    }
}

/// Summary of the effective configuration; secrets are never shown
pub fn render_config(config: &ExporterConfig) -> String {
    let paths = config.paths();
    let logging = config.logging();
    let token = match &config.gcp.access_token {
        Some(token) if !token.expose_secret().is_empty() => "configured (hidden)",
        _ => "metadata server",
    };
    let timeout = config
        .extract_timeout_secs
        .map(|s| format!("{s}s"))
        .unwrap_or_else(|| "none".to_string());

    let mut out = String::from("Configuration Summary:\n");
    out.push_str(&format!("  Source Table: {}\n", config.table_ref()));
    out.push_str(&format!("  Destination Bucket: {}\n", config.destination_bucket));
    out.push_str(&format!("  Location: {}\n", config.location));
    out.push_str(&format!("  Log Level: {}\n", config.log_level));
    out.push_str(&format!(
        "  Log Sinks: console={} stackdriver={}\n",
        logging.console_enabled, logging.stackdriver_enabled
    ));
    out.push_str(&format!(
        "  Local Status File: {}\n",
        paths.local_status_file().display()
    ));
    out.push_str(&format!(
        "  Remote Status Object: gs://{}/{}\n",
        paths.bucket(),
        paths.remote_status_object()
    ));
    out.push_str(&format!("  Extract Timeout: {timeout}\n"));
    out.push_str(&format!("  Access Token: {token}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_render_config_hides_token() {
        let config = parse_config(
            r#"{
                "source_project_id": "prj",
                "source_dataset_id": "ds",
                "source_table_id": "billing",
                "destination_bucket": "archive",
                "extract_timeout_secs": 3600,
                "gcp": {"access_token": "ya29.secret-token"}
            }"#,
        )
        .unwrap();

        let text = render_config(&config);
        assert!(text.contains("Source Table: prj.ds.billing"));
        assert!(text.contains("gs://archive/billing/process_status/extract_status_file.json"));
        assert!(text.contains("Extract Timeout: 3600s"));
        assert!(text.contains("configured (hidden)"));
        assert!(!text.contains("ya29.secret-token"));
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let code = execute(Some("/nonexistent/exporter.json")).await.unwrap();
        assert_eq!(code, exit_code::CONFIGURATION);
    }
}
