//! Domain error types
//!
//! This module defines the error hierarchy for the exporter.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main exporter error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Configuration-related errors (missing fields, missing bucket)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Data warehouse errors
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    /// Object store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Status ledger errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Partition enumeration failed
    #[error("Partition enumeration failed: {0}")]
    Enumeration(String),

    /// Extract job failed for a partition
    #[error("Extract failed for partition {partition}: {message}")]
    Extract { partition: String, message: String },

    /// Operation exceeded its configured time limit
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Data warehouse errors
///
/// Errors that occur when talking to the warehouse query and extract APIs.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Failed to reach the warehouse API
    #[error("Failed to connect to warehouse: {0}")]
    ConnectionFailed(String),

    /// Query could not be executed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Extract job could not be submitted
    #[error("Extract job submission failed: {0}")]
    JobSubmissionFailed(String),

    /// Extract job finished with an error
    #[error("Extract job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// Table or partition not found
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Unexpected status code
    #[error("Warehouse API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response could not be interpreted
    #[error("Invalid response from warehouse: {0}")]
    InvalidResponse(String),
}

/// Object store errors
///
/// Errors that occur when talking to the destination object store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to reach the object store
    #[error("Failed to connect to object store: {0}")]
    ConnectionFailed(String),

    /// Destination bucket does not exist
    #[error("Bucket does not exist: {0}")]
    BucketNotFound(String),

    /// Object does not exist
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Write was rejected
    #[error("Failed to write object {name}: {message}")]
    WriteFailed { name: String, message: String },

    /// Unexpected status code
    #[error("Object store API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response could not be interpreted
    #[error("Invalid response from object store: {0}")]
    InvalidResponse(String),
}

impl ExporterError {
    /// Builds an extract error for a partition
    pub fn extract(partition: impl ToString, message: impl Into<String>) -> Self {
        ExporterError::Extract {
            partition: partition.to_string(),
            message: message.into(),
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ExporterError {
    fn from(err: serde_json::Error) -> Self {
        ExporterError::Serialization(err.to_string())
    }
}
