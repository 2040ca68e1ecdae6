//! The persisted settings document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domains::{migrate_domains, DomainEntry, RawDomainEntry};
use crate::provider::{api_token, ProviderConfig, ProviderFields, MASK_SENTINEL};

/// Provider active when none is configured.
pub const DEFAULT_DNS_PROVIDER: &str = "cloudflare";

/// Providers seeded with empty credential sets in fresh settings, with the
/// field names each one expects.
const SEEDED_PROVIDERS: &[(&str, &[&str])] = &[
    ("cloudflare", &["api_token"]),
    ("route53", &["access_key_id", "secret_access_key", "region"]),
    (
        "azure",
        &[
            "subscription_id",
            "resource_group",
            "tenant_id",
            "client_id",
            "client_secret",
        ],
    ),
    ("google", &["project_id", "service_account_key"]),
    ("powerdns", &["api_url", "api_key"]),
    ("digitalocean", &["api_token"]),
    ("linode", &["api_key"]),
    ("gandi", &["api_token"]),
    (
        "ovh",
        &[
            "endpoint",
            "application_key",
            "application_secret",
            "consumer_key",
        ],
    ),
    ("namecheap", &["username", "api_key"]),
];

/// Service settings as persisted in `settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredSettings")]
pub struct Settings {
    /// ACME account contact email
    pub email: String,

    /// Whether the scheduler renews certificates
    pub auto_renew: bool,

    /// Active provider id, used for domains without an explicit provider
    pub dns_provider: String,

    /// Credentials per provider id
    pub dns_providers: BTreeMap<String, ProviderConfig>,

    /// Bearer token expected by the API layer
    pub api_bearer_token: String,

    /// Managed domains
    pub domains: Vec<DomainEntry>,

    /// Set once the operator finished initial setup
    pub setup_completed: bool,

    /// Legacy single-field Cloudflare token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cloudflare_token: String,
}

impl Default for Settings {
    fn default() -> Self {
        let dns_providers = SEEDED_PROVIDERS
            .iter()
            .map(|(id, fields)| {
                let mut values: ProviderFields = fields
                    .iter()
                    .map(|f| (f.to_string(), String::new()))
                    .collect();
                if *id == "route53" {
                    values.insert("region".to_string(), "us-east-1".to_string());
                }
                (id.to_string(), ProviderConfig::from_fields(values))
            })
            .collect();

        Self {
            email: String::new(),
            auto_renew: true,
            dns_provider: DEFAULT_DNS_PROVIDER.to_string(),
            dns_providers,
            api_bearer_token: String::new(),
            domains: Vec::new(),
            setup_completed: false,
            cloudflare_token: String::new(),
        }
    }
}

impl Settings {
    /// Default settings carrying the given bearer token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            api_bearer_token: token.into(),
            ..Self::default()
        }
    }

    /// Provider assigned to a domain, falling back to the active provider.
    pub fn provider_for(&self, domain: &str) -> &str {
        self.domains
            .iter()
            .find(|entry| entry.domain.eq_ignore_ascii_case(domain))
            .map(|entry| entry.dns_provider.as_str())
            .filter(|provider| !provider.is_empty())
            .unwrap_or(&self.dns_provider)
    }

    /// Whether the named domain is managed.
    pub fn has_domain(&self, domain: &str) -> bool {
        self.domains
            .iter()
            .any(|entry| entry.domain.eq_ignore_ascii_case(domain))
    }

    /// Record `domain` as managed by `provider`.
    ///
    /// Updates the provider of an existing entry. Returns whether anything
    /// changed.
    pub fn track_domain(&mut self, domain: &str, provider: &str) -> bool {
        match self
            .domains
            .iter_mut()
            .find(|entry| entry.domain.eq_ignore_ascii_case(domain))
        {
            Some(entry) if entry.dns_provider == provider => false,
            Some(entry) => {
                entry.dns_provider = provider.to_string();
                true
            }
            None => {
                self.domains.push(DomainEntry::new(domain, provider));
                true
            }
        }
    }

    /// Setup counts as complete once flagged, or once an email and at least
    /// one domain are present.
    pub fn is_setup_completed(&self) -> bool {
        self.setup_completed || (!self.email.is_empty() && !self.domains.is_empty())
    }

    /// Stored credentials for a provider.
    pub fn provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.dns_providers.get(provider)
    }

    /// Merge a partial update into these settings.
    ///
    /// Nothing is validated here; [`crate::SettingsStore::save`] validates
    /// the merged result.
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(token) = update.cloudflare_token {
            let merged = match self.dns_providers.get("cloudflare") {
                Some(existing) => {
                    let mut fields = existing.to_fields();
                    fields.insert("api_token".to_string(), token.clone());
                    ProviderConfig::from_fields(fields)
                }
                None => api_token(token.clone()),
            };
            self.dns_providers.insert("cloudflare".to_string(), merged);
            self.cloudflare_token = token;
        }

        if let Some(domains) = update.domains {
            let (entries, _) = migrate_domains(domains, &self.dns_provider);
            self.domains = entries;
        }
        if let Some(email) = update.email {
            self.email = email;
        }
        if let Some(auto_renew) = update.auto_renew {
            self.auto_renew = auto_renew;
        }
        if let Some(token) = update.api_bearer_token {
            if token != MASK_SENTINEL {
                self.api_bearer_token = token;
            }
        }
        if let Some(provider) = update.dns_provider {
            self.dns_provider = provider;
        }
        if let Some(setup_completed) = update.setup_completed {
            self.setup_completed = setup_completed;
        }

        if let Some(providers) = update.dns_providers {
            for (id, incoming) in providers {
                let merged = match self.dns_providers.get(&id) {
                    Some(existing) => existing.merged_with(&incoming),
                    None => ProviderConfig::Generic(ProviderFields::new()).merged_with(&incoming),
                };
                self.dns_providers.insert(id, merged);
            }
        }
    }
}

/// Partial settings change, as submitted by an API client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub email: Option<String>,
    pub auto_renew: Option<bool>,
    pub dns_provider: Option<String>,
    pub dns_providers: Option<BTreeMap<String, ProviderFields>>,
    pub api_bearer_token: Option<String>,
    pub domains: Option<Vec<RawDomainEntry>>,
    pub setup_completed: Option<bool>,
    pub cloudflare_token: Option<String>,
}

/// Settings view safe to expose outside the trust boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaskedSettings {
    pub email: String,
    pub auto_renew: bool,
    pub dns_provider: String,
    pub dns_providers: BTreeMap<String, ProviderFields>,
    pub domains: Vec<DomainEntry>,
    pub setup_completed: bool,
    pub has_api_bearer_token: bool,
    pub has_cloudflare_token: bool,
}

impl From<&Settings> for MaskedSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            email: settings.email.clone(),
            auto_renew: settings.auto_renew,
            dns_provider: settings.dns_provider.clone(),
            dns_providers: settings
                .dns_providers
                .iter()
                .map(|(id, config)| (id.clone(), config.masked()))
                .collect(),
            domains: settings.domains.clone(),
            setup_completed: settings.is_setup_completed(),
            has_api_bearer_token: !settings.api_bearer_token.is_empty(),
            has_cloudflare_token: !settings.cloudflare_token.is_empty(),
        }
    }
}

/// On-disk shape of any schema version. Missing keys take defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct StoredSettings {
    email: String,
    auto_renew: bool,
    dns_provider: String,
    dns_providers: BTreeMap<String, ProviderConfig>,
    api_bearer_token: String,
    domains: Vec<RawDomainEntry>,
    setup_completed: bool,
    cloudflare_token: String,
}

impl Default for StoredSettings {
    fn default() -> Self {
        let defaults = Settings::default();
        Self {
            email: defaults.email,
            auto_renew: defaults.auto_renew,
            dns_provider: defaults.dns_provider,
            dns_providers: defaults.dns_providers,
            api_bearer_token: defaults.api_bearer_token,
            domains: Vec::new(),
            setup_completed: defaults.setup_completed,
            cloudflare_token: defaults.cloudflare_token,
        }
    }
}

impl StoredSettings {
    /// Migrate into [`Settings`], reporting whether the domain list changed.
    pub(crate) fn into_settings(self) -> (Settings, bool) {
        let dns_provider = if self.dns_provider.is_empty() {
            DEFAULT_DNS_PROVIDER.to_string()
        } else {
            self.dns_provider
        };
        let (domains, migrated) = migrate_domains(self.domains, &dns_provider);

        let settings = Settings {
            email: self.email,
            auto_renew: self.auto_renew,
            dns_provider,
            dns_providers: self.dns_providers,
            api_bearer_token: self.api_bearer_token,
            domains,
            setup_completed: self.setup_completed,
            cloudflare_token: self.cloudflare_token,
        };
        (settings, migrated)
    }
}

impl From<StoredSettings> for Settings {
    fn from(stored: StoredSettings) -> Self {
        stored.into_settings().0
    }
}
