//! Built-in providers
//!
//! Most plugins read a flat file mapping each credential field to a
//! `dns_<plugin>_<name>` key; those are all [`FieldMapProvider`]s. Cloudflare
//! (legacy token, propagation delay), Google (service-account side file) and
//! RFC2136 (defaulted algorithm) get their own types.

use std::path::Path;
use std::sync::Arc;

use certmate_config::{ProviderConfig, Settings};

use super::credentials::write_private_file;
use super::{render_ini, DnsProvider, ProviderError, ProviderResult};

/// Seconds the Cloudflare plugin waits for record propagation
const CLOUDFLARE_PROPAGATION_SECONDS: u32 = 60;

/// Default TSIG algorithm for RFC2136
const DEFAULT_TSIG_ALGORITHM: &str = "HMAC-SHA512";

fn value(config: &ProviderConfig, field: &str) -> String {
    config.get(field).unwrap_or_default()
}

// ============================================================================
// Field map providers
// ============================================================================

/// Provider whose credential file is a direct field-to-key mapping
#[derive(Debug, Clone)]
pub struct FieldMapProvider {
    id: &'static str,
    name: &'static str,
    /// (settings field, credential file key), all required
    fields: &'static [(&'static str, &'static str)],
    optional: &'static [&'static str],
    /// Fixed lines appended after the mapped fields
    static_lines: &'static [(&'static str, &'static str)],
}

impl FieldMapProvider {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        fields: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            id,
            name,
            fields,
            optional: &[],
            static_lines: &[],
        }
    }

    pub const fn with_optional(mut self, optional: &'static [&'static str]) -> Self {
        self.optional = optional;
        self
    }

    pub const fn with_static_lines(mut self, lines: &'static [(&'static str, &'static str)]) -> Self {
        self.static_lines = lines;
        self
    }
}

impl DnsProvider for FieldMapProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn display_name(&self) -> &'static str {
        self.name
    }

    fn required_fields(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(field, _)| *field).collect()
    }

    fn optional_fields(&self) -> Vec<&'static str> {
        self.optional.to_vec()
    }

    fn render_credentials(&self, config: &ProviderConfig, _dir: &Path) -> ProviderResult<String> {
        let mut lines: Vec<(&str, &str, String)> = self
            .fields
            .iter()
            .map(|(field, key)| (*field, *key, value(config, field)))
            .collect();
        lines.extend(
            self.static_lines
                .iter()
                .map(|(key, v)| (*key, *key, v.to_string())),
        );
        render_ini(self.id, &lines)
    }
}

// ============================================================================
// Cloudflare
// ============================================================================

/// Cloudflare API token provider, with fallback to the legacy
/// `cloudflare_token` setting
#[derive(Debug, Clone, Default)]
pub struct CloudflareProvider;

impl DnsProvider for CloudflareProvider {
    fn id(&self) -> &'static str {
        "cloudflare"
    }

    fn display_name(&self) -> &'static str {
        "Cloudflare"
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["api_token"]
    }

    fn legacy_config(&self, settings: &Settings) -> Option<ProviderConfig> {
        if settings.cloudflare_token.is_empty() {
            return None;
        }
        Some(certmate_config::provider::api_token(
            settings.cloudflare_token.clone(),
        ))
    }

    fn render_credentials(&self, config: &ProviderConfig, _dir: &Path) -> ProviderResult<String> {
        render_ini(
            self.id(),
            &[(
                "api_token",
                "dns_cloudflare_api_token",
                value(config, "api_token"),
            )],
        )
    }

    fn extra_args(&self) -> Vec<String> {
        vec![
            "--dns-cloudflare-propagation-seconds".to_string(),
            CLOUDFLARE_PROPAGATION_SECONDS.to_string(),
        ]
    }
}

// ============================================================================
// Google Cloud DNS
// ============================================================================

/// Google Cloud DNS; the service account JSON goes into a side file that the
/// credential file points to
#[derive(Debug, Clone, Default)]
pub struct GoogleProvider;

impl GoogleProvider {
    /// Name of the service account file inside the credentials directory
    pub const SERVICE_ACCOUNT_FILE: &'static str = "google-service-account.json";
}

impl DnsProvider for GoogleProvider {
    fn id(&self) -> &'static str {
        "google"
    }

    fn display_name(&self) -> &'static str {
        "Google Cloud DNS"
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["project_id", "service_account_key"]
    }

    fn render_credentials(&self, config: &ProviderConfig, dir: &Path) -> ProviderResult<String> {
        let key_path = dir.join(Self::SERVICE_ACCOUNT_FILE);
        write_private_file(&key_path, value(config, "service_account_key").as_bytes()).map_err(
            |source| ProviderError::Io {
                provider: self.id().to_string(),
                source,
            },
        )?;

        render_ini(
            self.id(),
            &[
                (
                    "project_id",
                    "dns_google_project_id",
                    value(config, "project_id"),
                ),
                (
                    "service_account_key",
                    "dns_google_service_account_key",
                    key_path.display().to_string(),
                ),
            ],
        )
    }
}

// ============================================================================
// RFC2136
// ============================================================================

/// RFC2136 dynamic updates signed with a TSIG key
#[derive(Debug, Clone, Default)]
pub struct Rfc2136Provider;

impl DnsProvider for Rfc2136Provider {
    fn id(&self) -> &'static str {
        "rfc2136"
    }

    fn display_name(&self) -> &'static str {
        "RFC2136"
    }

    fn required_fields(&self) -> Vec<&'static str> {
        vec!["nameserver", "tsig_key", "tsig_secret"]
    }

    fn optional_fields(&self) -> Vec<&'static str> {
        vec!["tsig_algorithm"]
    }

    fn render_credentials(&self, config: &ProviderConfig, _dir: &Path) -> ProviderResult<String> {
        let algorithm = config
            .get("tsig_algorithm")
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_TSIG_ALGORITHM.to_string());

        render_ini(
            self.id(),
            &[
                (
                    "nameserver",
                    "dns_rfc2136_nameserver",
                    value(config, "nameserver"),
                ),
                ("tsig_key", "dns_rfc2136_name", value(config, "tsig_key")),
                (
                    "tsig_secret",
                    "dns_rfc2136_secret",
                    value(config, "tsig_secret"),
                ),
                ("tsig_algorithm", "dns_rfc2136_algorithm", algorithm),
            ],
        )
    }
}

// ============================================================================
// Catalogue
// ============================================================================

const ROUTE53: FieldMapProvider = FieldMapProvider::new(
    "route53",
    "AWS Route53",
    &[
        ("access_key_id", "dns_route53_access_key_id"),
        ("secret_access_key", "dns_route53_secret_access_key"),
    ],
)
.with_optional(&["region"]);

const AZURE: FieldMapProvider = FieldMapProvider::new(
    "azure",
    "Azure DNS",
    &[
        ("subscription_id", "dns_azure_subscription_id"),
        ("resource_group", "dns_azure_resource_group"),
        ("tenant_id", "dns_azure_tenant_id"),
        ("client_id", "dns_azure_client_id"),
        ("client_secret", "dns_azure_client_secret"),
    ],
);

const LINODE: FieldMapProvider =
    FieldMapProvider::new("linode", "Linode", &[("api_key", "dns_linode_key")])
        .with_static_lines(&[("dns_linode_version", "4")]);

const FIELD_MAP_PROVIDERS: &[FieldMapProvider] = &[
    ROUTE53,
    AZURE,
    FieldMapProvider::new(
        "powerdns",
        "PowerDNS",
        &[
            ("api_url", "dns_powerdns_api_url"),
            ("api_key", "dns_powerdns_api_key"),
        ],
    ),
    FieldMapProvider::new(
        "digitalocean",
        "DigitalOcean",
        &[("api_token", "dns_digitalocean_token")],
    ),
    LINODE,
    FieldMapProvider::new("gandi", "Gandi", &[("api_token", "dns_gandi_token")]),
    FieldMapProvider::new(
        "ovh",
        "OVH",
        &[
            ("endpoint", "dns_ovh_endpoint"),
            ("application_key", "dns_ovh_application_key"),
            ("application_secret", "dns_ovh_application_secret"),
            ("consumer_key", "dns_ovh_consumer_key"),
        ],
    ),
    FieldMapProvider::new(
        "namecheap",
        "Namecheap",
        &[
            ("username", "dns_namecheap_username"),
            ("api_key", "dns_namecheap_api_key"),
        ],
    ),
    FieldMapProvider::new("vultr", "Vultr", &[("api_key", "dns_vultr_api_key")]),
    FieldMapProvider::new(
        "dnsmadeeasy",
        "DNS Made Easy",
        &[
            ("api_key", "dns_dnsmadeeasy_api_key"),
            ("secret_key", "dns_dnsmadeeasy_secret_key"),
        ],
    ),
    FieldMapProvider::new("nsone", "NS1", &[("api_key", "dns_nsone_api_key")]),
    FieldMapProvider::new(
        "hetzner",
        "Hetzner DNS",
        &[("api_token", "dns_hetzner_api_token")],
    ),
    FieldMapProvider::new(
        "porkbun",
        "Porkbun",
        &[
            ("api_key", "dns_porkbun_api_key"),
            ("secret_key", "dns_porkbun_secret_key"),
        ],
    ),
    FieldMapProvider::new(
        "godaddy",
        "GoDaddy",
        &[("api_key", "dns_godaddy_key"), ("secret", "dns_godaddy_secret")],
    ),
    FieldMapProvider::new(
        "he-ddns",
        "Hurricane Electric",
        &[
            ("username", "dns_he_ddns_username"),
            ("password", "dns_he_ddns_password"),
        ],
    ),
    FieldMapProvider::new("dynudns", "Dynu", &[("token", "dns_dynudns_token")]),
];

/// Every provider shipped with CertMate
pub fn builtin_providers() -> Vec<Arc<dyn DnsProvider>> {
    let mut providers: Vec<Arc<dyn DnsProvider>> = vec![
        Arc::new(CloudflareProvider),
        Arc::new(GoogleProvider),
        Arc::new(Rfc2136Provider),
    ];
    providers.extend(
        FIELD_MAP_PROVIDERS
            .iter()
            .cloned()
            .map(|p| Arc::new(p) as Arc<dyn DnsProvider>),
    );
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use certmate_config::ProviderFields;
    use tempfile::TempDir;

    fn config(pairs: &[(&str, &str)]) -> ProviderConfig {
        ProviderConfig::from_fields(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<ProviderFields>(),
        )
    }

    fn find(id: &str) -> Arc<dyn DnsProvider> {
        builtin_providers()
            .into_iter()
            .find(|p| p.id() == id)
            .unwrap()
    }

    #[test]
    fn test_catalogue_ids_are_unique() {
        let providers = builtin_providers();
        let mut ids: Vec<_> = providers.iter().map(|p| p.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), providers.len());
        assert_eq!(providers.len(), 19);
    }

    #[test]
    fn test_linode_appends_api_version() {
        let dir = TempDir::new().unwrap();
        let ini = find("linode")
            .render_credentials(&config(&[("api_key", "lk")]), dir.path())
            .unwrap();
        assert_eq!(ini, "dns_linode_key = lk\ndns_linode_version = 4\n");
    }

    #[test]
    fn test_godaddy_key_names() {
        let dir = TempDir::new().unwrap();
        let ini = find("godaddy")
            .render_credentials(&config(&[("api_key", "k"), ("secret", "s")]), dir.path())
            .unwrap();
        assert_eq!(ini, "dns_godaddy_key = k\ndns_godaddy_secret = s\n");
    }

    #[test]
    fn test_route53_region_is_optional() {
        let route53 = find("route53");
        assert_eq!(route53.optional_fields(), vec!["region"]);
        assert!(route53.is_configured(Some(&config(&[
            ("access_key_id", "a"),
            ("secret_access_key", "s"),
        ]))));
        assert_eq!(
            route53.missing_fields(Some(&config(&[("access_key_id", "a")]))),
            vec!["secret_access_key"]
        );
        assert!(!route53.is_configured(None));
    }

    #[test]
    fn test_rfc2136_defaults_algorithm() {
        let dir = TempDir::new().unwrap();
        let provider = find("rfc2136");
        let ini = provider
            .render_credentials(
                &config(&[
                    ("nameserver", "192.0.2.53"),
                    ("tsig_key", "certmate."),
                    ("tsig_secret", "c2VjcmV0"),
                ]),
                dir.path(),
            )
            .unwrap();
        assert!(ini.contains("dns_rfc2136_name = certmate.\n"));
        assert!(ini.ends_with("dns_rfc2136_algorithm = HMAC-SHA512\n"));

        let ini = provider
            .render_credentials(
                &config(&[
                    ("nameserver", "192.0.2.53"),
                    ("tsig_key", "certmate."),
                    ("tsig_secret", "c2VjcmV0"),
                    ("tsig_algorithm", "HMAC-SHA256"),
                ]),
                dir.path(),
            )
            .unwrap();
        assert!(ini.ends_with("dns_rfc2136_algorithm = HMAC-SHA256\n"));
    }

    #[test]
    fn test_google_writes_service_account_file() {
        let dir = TempDir::new().unwrap();
        let key = "{\n  \"type\": \"service_account\"\n}";
        let ini = GoogleProvider
            .render_credentials(
                &config(&[("project_id", "proj"), ("service_account_key", key)]),
                dir.path(),
            )
            .unwrap();

        let key_path = dir.path().join(GoogleProvider::SERVICE_ACCOUNT_FILE);
        assert_eq!(std::fs::read_to_string(&key_path).unwrap(), key);
        assert!(ini.contains("dns_google_project_id = proj\n"));
        assert!(ini.contains(&format!(
            "dns_google_service_account_key = {}\n",
            key_path.display()
        )));
    }

    #[test]
    fn test_cloudflare_legacy_and_args() {
        let mut settings = Settings::default();
        assert!(CloudflareProvider.legacy_config(&settings).is_none());

        settings.cloudflare_token = "legacy".to_string();
        let legacy = CloudflareProvider.legacy_config(&settings).unwrap();
        assert!(CloudflareProvider.is_configured(Some(&legacy)));
        assert_eq!(
            CloudflareProvider.extra_args(),
            vec!["--dns-cloudflare-propagation-seconds", "60"]
        );
    }
}
