//! Certificate lifecycle error types

use std::io;

use certmate_common::ValidationError;
use thiserror::Error;

use crate::providers::ProviderError;

/// Errors from issuance and renewal
#[derive(Debug, Error)]
pub enum CertError {
    /// Domain or email rejected; nothing was started
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Provider unknown or incompletely configured; nothing was started
    #[error("configuration error: {0}")]
    Configuration(#[from] ProviderError),

    /// The ACME client exited unsuccessfully
    #[error("certbot failed for '{domain}': {diagnostic}")]
    ExternalTool { domain: String, diagnostic: String },

    /// The ACME client was killed after the configured timeout
    #[error("certbot timed out for '{domain}' after {elapsed_secs}s")]
    Timeout { domain: String, elapsed_secs: u64 },

    /// The ACME client could not be started
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Working directories or the certificate store could not be written
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CertError {
    /// Whether the error was detected before any external process ran
    pub fn is_rejected_upfront(&self) -> bool {
        matches!(self, CertError::Validation(_) | CertError::Configuration(_))
    }
}

/// Certificate store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The ACME client reported success but an artifact is missing
    #[error("certificate artifact '{file}' not found in {dir}")]
    MissingArtifact { file: String, dir: String },
}

/// Renewal schedule errors
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid renewal schedule '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("renewal schedule '{0}' has no upcoming firings")]
    Exhausted(String),
}
