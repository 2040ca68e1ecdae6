//! Service configuration
//!
//! Process-level knobs read from `CERTMATE_*` environment variables. These are
//! distinct from [`crate::Settings`], which is operator data persisted on disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::errors::ConfigError;

/// Environment variable prefix for [`AppConfig`] fields.
pub const ENV_PREFIX: &str = "CERTMATE_";

/// Environment variable that seeds the bearer token of fresh settings.
pub const TOKEN_ENV_VAR: &str = "API_BEARER_TOKEN";

// ============================================================================
// Application Configuration
// ============================================================================

/// Service-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding `settings.json`
    pub data_dir: PathBuf,

    /// Certificate store root, one directory per domain
    pub cert_dir: PathBuf,

    /// Root for per-domain ACME client state and credential files
    pub acme_dir: PathBuf,

    /// ACME client executable
    pub certbot_bin: String,

    /// Cron expression for the renewal sweep (seconds field first, UTC)
    pub renewal_schedule: String,

    /// Maximum concurrent background certificate operations
    #[validate(range(min = 1, max = 64))]
    pub max_workers: usize,

    /// Kill the ACME client after this many seconds (unset = wait forever)
    #[validate(range(min = 1))]
    pub acme_timeout_secs: Option<u64>,

    /// Connect and handshake timeout for deployment checks
    #[validate(range(min = 1, max = 120))]
    pub deployment_timeout_secs: u64,

    /// How long shutdown waits for in-flight operations
    pub shutdown_grace_secs: u64,

    /// Bearer token for fresh settings; falls back to `API_BEARER_TOKEN`
    pub api_bearer_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cert_dir: PathBuf::from("certificates"),
            acme_dir: PathBuf::from("letsencrypt"),
            certbot_bin: "certbot".to_string(),
            renewal_schedule: "0 0 2 * * *".to_string(),
            max_workers: 4,
            acme_timeout_secs: None,
            deployment_timeout_secs: 10,
            shutdown_grace_secs: 30,
            api_bearer_token: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from `CERTMATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config: AppConfig = envy::prefixed(ENV_PREFIX).from_env()?;
        if config.api_bearer_token.is_none() {
            config.api_bearer_token = std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty());
        }
        debug!(
            data_dir = %config.data_dir.display(),
            cert_dir = %config.cert_dir.display(),
            max_workers = config.max_workers,
            "Loaded service configuration"
        );
        config.validated()
    }

    /// Return self if all values are in range.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Path of the settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}
