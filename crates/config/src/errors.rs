//! Error types for settings persistence and service configuration.

use std::io;

use certmate_common::ValidationError;
use thiserror::Error;

/// Errors that can occur while saving settings.
///
/// Load never fails: read and parse problems fall back to defaults.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Email or bearer token failed validation; nothing was written.
    #[error("settings validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// IO error while writing the settings file
    #[error("settings IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to acquire the advisory lock
    #[error("failed to lock settings file {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to serialize or deserialize the settings document
    #[error("settings serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Serialization(e.to_string())
    }
}

/// Errors in the service configuration (environment and CLI overrides).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variables could not be deserialized
    #[error("failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
