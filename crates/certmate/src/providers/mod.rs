//! DNS provider catalogue for DNS-01 challenges
//!
//! Each provider knows which credential fields it needs and how to render
//! them into the key-value file its certbot DNS plugin reads. DNS records are
//! never touched here; the plugin does that during the certbot run.
//!
//! # Architecture
//!
//! - [`DnsProvider`] - Per-provider capability set (required fields, credential rendering)
//! - [`ProviderRegistry`] - Lookup table keyed by provider id
//! - [`ChallengeSetup`] - Plugin id and arguments handed to the ACME client

mod builtin;
mod credentials;
mod registry;

pub use builtin::{
    builtin_providers, CloudflareProvider, FieldMapProvider, GoogleProvider, Rfc2136Provider,
};
pub use credentials::{ensure_private_dir, write_private_file};
pub use registry::{ProviderCatalog, ProviderRegistry, ProviderStatus};

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

use certmate_config::{ProviderConfig, Settings};
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Configuration problems detected before any ACME client run
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No provider registered under this id
    #[error(
        "DNS provider '{provider}' is not supported. Supported providers: {}",
        supported.join(", ")
    )]
    Unsupported {
        provider: String,
        supported: Vec<String>,
    },

    /// One or more required credential fields are empty
    #[error(
        "DNS provider '{provider}' is missing required credentials: {}",
        missing.join(", ")
    )]
    MissingCredentials {
        provider: String,
        missing: Vec<String>,
    },

    /// A credential value cannot be written to a key-value file
    #[error("DNS provider '{provider}' field '{field}' contains a line break")]
    InvalidValue { provider: String, field: String },

    /// Writing a credential artifact failed
    #[error("failed to write credentials for '{provider}': {source}")]
    Io {
        provider: String,
        #[source]
        source: io::Error,
    },
}

/// What the ACME client needs to run a DNS-01 challenge with a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSetup {
    /// Provider id from settings
    pub provider: String,
    /// Certbot plugin name, used as `--dns-<plugin>`
    pub plugin: String,
    /// Credential file written for this run
    pub credentials_path: PathBuf,
    /// Plugin arguments, credentials flag first
    pub args: Vec<String>,
}

/// A DNS provider supported through a certbot DNS plugin
///
/// Implementations must be stateless; one instance serves every domain.
pub trait DnsProvider: Send + Sync + Debug {
    /// Provider id as used in settings (e.g., "cloudflare", "route53")
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str;

    /// Certbot plugin name. Defaults to the provider id.
    fn plugin(&self) -> &'static str {
        self.id()
    }

    /// Fields that must be non-empty before a challenge can run
    fn required_fields(&self) -> Vec<&'static str>;

    /// Fields that are used when present
    fn optional_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Required fields that are absent or empty in `config`
    fn missing_fields(&self, config: Option<&ProviderConfig>) -> Vec<&'static str> {
        self.required_fields()
            .into_iter()
            .filter(|field| !config.is_some_and(|c| c.has(field)))
            .collect()
    }

    /// Pure completeness check over the required fields
    fn is_configured(&self, config: Option<&ProviderConfig>) -> bool {
        self.missing_fields(config).is_empty()
    }

    /// Credentials derived from pre-structured settings, if this provider
    /// had a legacy setting
    fn legacy_config(&self, _settings: &Settings) -> Option<ProviderConfig> {
        None
    }

    /// Render the plugin credential file contents.
    ///
    /// `dir` is the private directory the file will be written to; providers
    /// that need side files write them there.
    fn render_credentials(&self, config: &ProviderConfig, dir: &Path) -> ProviderResult<String>;

    /// Additional plugin arguments beyond the credentials flag
    fn extra_args(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Render `key = value` lines, rejecting values that would break the format.
pub(crate) fn render_ini(
    provider: &str,
    lines: &[(&str, &str, String)],
) -> ProviderResult<String> {
    let mut out = String::new();
    for (field, key, value) in lines {
        if value.contains('\n') || value.contains('\r') {
            return Err(ProviderError::InvalidValue {
                provider: provider.to_string(),
                field: field.to_string(),
            });
        }
        out.push_str(key);
        out.push_str(" = ");
        out.push_str(value);
        out.push('\n');
    }
    Ok(out)
}
