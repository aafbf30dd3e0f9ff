//! Core error types for habitloop-core.
//!
//! This module defines the error hierarchy using thiserror. Errors are
//! grouped by concern; `CoreError` is the umbrella type used at the
//! library boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for habitloop-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Cache-related errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Remote gateway errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local storage errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Errors raised by cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The habit has no progress entry in the current week.
    ///
    /// Recoverable: the caller may trigger a targeted single-habit fetch.
    #[error("no progress entry for habit '{habit_id}' in the current week")]
    NotFound { habit_id: String },
}

/// Remote gateway errors.
///
/// These never escalate past the sync boundary: a failed cycle is logged
/// and skipped, and the next scheduled cycle retries naturally.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout
    #[error("gateway request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The server responded with a non-success status
    #[error("gateway returned status {status}")]
    Status { status: u16 },

    /// The response body could not be decoded into progress records
    #[error("failed to decode gateway response: {0}")]
    Decode(String),

    /// The configured endpoint is not a valid URL
    #[error("invalid gateway URL: {0}")]
    InvalidUrl(String),

    /// Authentication token missing or rejected
    #[error("gateway authentication failed")]
    Auth,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Local storage errors (cache snapshot file, client id).
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error reading or writing a storage file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored client id did not match the expected format
    #[error("Invalid client id format: {0}")]
    InvalidClientId(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
