//! Error types for Warden
//!
//! `WardenError` covers the whole taxonomy of the mutex and pool core:
//! - acquisition timeouts, surfaced to callers and never retried
//! - release failures, which callers report and suppress
//! - pool allocation shortfalls
//! - collaborator (store, serialization, configuration) failures

use std::time::Duration;

/// Result type used throughout Warden
pub type Result<T> = std::result::Result<T, WardenError>;

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum WardenError {
    #[error("timed out after {timeout:?} waiting for mutex '{name}'")]
    AcquisitionTimeout { name: String, timeout: Duration },

    #[error("failed to release mutex '{name}': {reason}")]
    ReleaseFailure { name: String, reason: String },

    #[error(
        "insufficient resources for '{requester}': requested {requested}, only {available} available"
    )]
    InsufficientResources {
        requester: String,
        requested: usize,
        available: usize,
    },

    #[error("resource '{0}' not found")]
    ResourceNotFound(String),

    #[error("resource '{id}' is in use by {owners:?}")]
    ResourceInUse { id: String, owners: Vec<String> },

    #[error("store error: {0}")]
    StoreError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl WardenError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WardenError::AcquisitionTimeout { .. })
    }

    pub fn is_insufficient_resources(&self) -> bool {
        matches!(self, WardenError::InsufficientResources { .. })
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(value: serde_json::Error) -> Self {
        WardenError::SerializationError(value.to_string())
    }
}

impl From<config::ConfigError> for WardenError {
    fn from(value: config::ConfigError) -> Self {
        WardenError::ConfigError(value.to_string())
    }
}
