//! Structured logging setup using tracing
//!
//! Sinks are chosen by the configuration's `logger` list: a human-readable
//! console layer on stderr, and a JSON layer on stdout that the cloud logging
//! agent ingests. Export runs also append a plain-text run log to the process
//! status directory so it can be uploaded when the run stops.
//!
//! # Example
//!
//! ```no_run
//! use billing_exporter::logging::init_logging;
//! use billing_exporter::config::LoggingConfig;
//!
//! let config = LoggingConfig {
//!     console_enabled: true,
//!     stackdriver_enabled: false,
//!     log_file: Some("billing/process_status/exporter.log".into()),
//! };
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//! ```

use crate::config::paths::ensure_parent_dir;
use crate::config::LoggingConfig;
use crate::domain::{ExporterError, Result};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Handle on the initialized logging system
#[derive(Debug)]
pub struct LoggingGuard {
    log_file: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run log every event is appended to, if one was configured
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Initialize the logging system based on configuration
///
/// `RUST_LOG` takes precedence over `log_level_str` when set.
///
/// # Errors
///
/// Returns a configuration error for an unknown level, when the run log
/// cannot be created, or when a global subscriber is already installed.
pub fn init_logging(log_level_str: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_level = parse_log_level(log_level_str)?;

    let mut layers = Vec::new();

    if config.console_enabled {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(build_filter(log_level));
        layers.push(console_layer.boxed());
    }

    if config.stackdriver_enabled {
        let stackdriver_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(std::io::stdout)
            .with_filter(build_filter(log_level));
        layers.push(stackdriver_layer.boxed());
    }

    if let Some(log_file) = &config.log_file {
        // Written synchronously so the file is complete when it is uploaded
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(open_run_log(log_file)?)
            .with_filter(build_filter(log_level));
        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| ExporterError::Configuration(format!("Failed to install logger: {e}")))?;

    tracing::info!(
        level = %log_level,
        console = config.console_enabled,
        stackdriver = config.stackdriver_enabled,
        log_file = ?config.log_file,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        log_file: config.log_file.clone(),
    })
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("billing_exporter={level}")))
}

fn open_run_log(path: &Path) -> Result<RollingFileAppender> {
    ensure_parent_dir(path).map_err(|e| {
        ExporterError::Configuration(format!(
            "Failed to create log directory for {}: {e}",
            path.display()
        ))
    })?;

    let (dir, name) = match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => (dir, name.to_string_lossy().into_owned()),
        _ => {
            return Err(ExporterError::Configuration(format!(
                "Invalid log file path: {}",
                path.display()
            )))
        }
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| {
            ExporterError::Configuration(format!(
                "Failed to open log file {}: {e}",
                path.display()
            ))
        })
}

/// Parse log level from string
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ExporterError::Configuration(format!(
            "Invalid log level: {level_str}. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}
