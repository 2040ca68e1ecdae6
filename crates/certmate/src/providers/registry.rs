//! Provider lookup table.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use certmate_config::{ProviderConfig, Settings};
use serde::Serialize;
use tracing::{debug, info};

use super::builtin::builtin_providers;
use super::credentials::{ensure_private_dir, write_private_file};
use super::{ChallengeSetup, DnsProvider, ProviderError, ProviderResult};

/// Configuration status of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub id: String,
    pub name: String,
    pub plugin: String,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    pub configured: bool,
}

/// Every known provider plus the active one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderCatalog {
    pub current_provider: String,
    pub providers: Vec<ProviderStatus>,
}

/// Registry of DNS providers keyed by provider id
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn DnsProvider>>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registry with every built-in provider
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for provider in builtin_providers() {
            registry.register(provider);
        }
        registry
    }

    /// Add or replace a provider
    pub fn register(&mut self, provider: Arc<dyn DnsProvider>) {
        debug!(provider = provider.id(), "Registered DNS provider");
        self.providers.insert(provider.id(), provider);
    }

    /// Look up a provider by id
    pub fn get(&self, id: &str) -> Option<&Arc<dyn DnsProvider>> {
        self.providers.get(id)
    }

    /// Sorted list of supported provider ids
    pub fn supported(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().map(|id| id.to_string()).collect();
        ids.sort();
        ids
    }

    /// Credentials to use for a provider: the structured config when it is
    /// complete, otherwise the provider's legacy setting when that is.
    fn effective_config(&self, provider: &dyn DnsProvider, settings: &Settings) -> Option<ProviderConfig> {
        let structured = settings.provider_config(provider.id()).cloned();
        if provider.is_configured(structured.as_ref()) {
            return structured;
        }

        match provider.legacy_config(settings) {
            Some(legacy) if provider.is_configured(Some(&legacy)) => Some(legacy),
            _ => structured,
        }
    }

    /// Whether a provider has every required credential. Unknown providers
    /// are never configured.
    pub fn is_configured(&self, id: &str, settings: &Settings) -> bool {
        match self.get(id) {
            Some(provider) => provider.is_configured(self.effective_config(provider.as_ref(), settings).as_ref()),
            None => false,
        }
    }

    /// Write the credential file for a provider into `dir` and return the
    /// challenge arguments for the ACME client.
    ///
    /// Completeness is checked before anything is written.
    pub fn materialize(&self, id: &str, settings: &Settings, dir: &Path) -> ProviderResult<ChallengeSetup> {
        let provider = self.get(id).ok_or_else(|| ProviderError::Unsupported {
            provider: id.to_string(),
            supported: self.supported(),
        })?;

        let config = self.effective_config(provider.as_ref(), settings);
        let missing = provider.missing_fields(config.as_ref());
        let config = match config {
            Some(config) if missing.is_empty() => config,
            _ => {
                return Err(ProviderError::MissingCredentials {
                    provider: id.to_string(),
                    missing: missing.into_iter().map(String::from).collect(),
                })
            }
        };

        let io_err = |source| ProviderError::Io {
            provider: id.to_string(),
            source,
        };

        ensure_private_dir(dir).map_err(io_err)?;
        let contents = provider.render_credentials(&config, dir)?;
        let credentials_path = dir.join(format!("{}.ini", provider.id()));
        write_private_file(&credentials_path, contents.as_bytes()).map_err(io_err)?;

        let plugin = provider.plugin();
        let mut args = vec![
            format!("--dns-{plugin}-credentials"),
            credentials_path.display().to_string(),
        ];
        args.extend(provider.extra_args());

        info!(
            provider = id,
            plugin = plugin,
            path = %credentials_path.display(),
            "Materialized DNS provider credentials"
        );

        Ok(ChallengeSetup {
            provider: id.to_string(),
            plugin: plugin.to_string(),
            credentials_path,
            args,
        })
    }

    /// Catalogue with configuration status for every provider
    pub fn describe(&self, settings: &Settings) -> ProviderCatalog {
        let providers = self
            .supported()
            .iter()
            .filter_map(|id| self.get(id))
            .map(|provider| ProviderStatus {
                id: provider.id().to_string(),
                name: provider.display_name().to_string(),
                plugin: provider.plugin().to_string(),
                required_fields: provider.required_fields().into_iter().map(String::from).collect(),
                optional_fields: provider.optional_fields().into_iter().map(String::from).collect(),
                configured: self.is_configured(provider.id(), settings),
            })
            .collect();

        ProviderCatalog {
            current_provider: settings.dns_provider.clone(),
            providers,
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.supported())
            .finish()
    }
}
