//! Domain entries and load-time migration of legacy domain lists.

use std::collections::HashSet;

use certmate_common::validate_domain;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A managed domain and the DNS provider used for its challenges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    pub domain: String,
    pub dns_provider: String,
}

impl DomainEntry {
    pub fn new(domain: impl Into<String>, dns_provider: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            dns_provider: dns_provider.into(),
        }
    }
}

/// Domain entry as found in a settings file of any schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDomainEntry {
    /// Bare domain name, written by early versions
    Legacy(String),
    /// Structured entry, possibly without a provider
    Structured {
        domain: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dns_provider: Option<String>,
    },
    /// Anything else; skipped during migration
    Invalid(serde_json::Value),
}

impl From<DomainEntry> for RawDomainEntry {
    fn from(entry: DomainEntry) -> Self {
        RawDomainEntry::Structured {
            domain: entry.domain,
            dns_provider: Some(entry.dns_provider),
        }
    }
}

/// Normalize raw entries into [`DomainEntry`] values.
///
/// Returns the entries and whether anything differed from the input. Running
/// the migration over its own output yields the same list and `false`.
pub fn migrate_domains(raw: Vec<RawDomainEntry>, default_provider: &str) -> (Vec<DomainEntry>, bool) {
    let mut changed = false;
    let mut entries = Vec::with_capacity(raw.len());

    for item in raw {
        match item {
            RawDomainEntry::Legacy(domain) => {
                debug!(domain = %domain, provider = default_provider, "Migrating legacy domain entry");
                entries.push(DomainEntry::new(domain, default_provider));
                changed = true;
            }
            RawDomainEntry::Structured {
                domain,
                dns_provider: Some(provider),
            } if !provider.is_empty() => {
                entries.push(DomainEntry::new(domain, provider));
            }
            RawDomainEntry::Structured { domain, .. } => {
                debug!(domain = %domain, provider = default_provider, "Assigning default provider to domain entry");
                entries.push(DomainEntry::new(domain, default_provider));
                changed = true;
            }
            RawDomainEntry::Invalid(value) => {
                warn!(entry = %value, "Skipping unrecognized domain entry");
                changed = true;
            }
        }
    }

    (entries, changed)
}

/// Validate and deduplicate domain entries before persisting.
///
/// Invalid names and case-insensitive duplicates are dropped with a warning;
/// the first occurrence of a domain wins.
pub fn normalize_domains(entries: &[DomainEntry], default_provider: &str) -> Vec<DomainEntry> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(entries.len());

    for entry in entries {
        let domain = match validate_domain(&entry.domain) {
            Ok(domain) => domain,
            Err(e) => {
                warn!(domain = %entry.domain, error = %e, "Dropping invalid domain from settings");
                continue;
            }
        };

        if !seen.insert(domain.clone()) {
            warn!(domain = %domain, "Dropping duplicate domain from settings");
            continue;
        }

        let provider = if entry.dns_provider.is_empty() {
            default_provider.to_string()
        } else {
            entry.dns_provider.clone()
        };
        normalized.push(DomainEntry::new(domain, provider));
    }

    normalized
}
