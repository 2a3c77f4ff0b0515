//! Notification engine errors

use prism_core::ConfigurationError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for notification operations
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors reading or writing persisted configurations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid bucket name for notification store: {0}")]
    InvalidBucket(String),

    #[error("Failed to prepare notification directory {path}: {source}")]
    Dir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read notification configuration {path}: {source}")]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode notification configuration {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to write notification configuration {path}: {source}")]
    Save {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode notification configuration for {bucket}: {source}")]
    Encode {
        bucket: String,
        source: serde_yaml::Error,
    },
}

/// Errors surfaced by the notification service
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid notification configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No notification configuration registered for bucket {bucket}")]
    NotRegistered { bucket: String },

    #[error("Notification intake for bucket {bucket} is full")]
    IntakeFull { bucket: String },

    #[error("Notification intake for bucket {bucket} is closed")]
    IntakeClosed { bucket: String },
}

/// Errors delivering one event to one target
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Unsupported notification target: {0}")]
    UnsupportedTarget(String),

    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Request to {target} failed: {source}")]
    Transport {
        target: String,
        source: reqwest::Error,
    },

    #[error("{target} returned status {status}")]
    Status { target: String, status: u16 },

    #[error("Invocation of {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}
