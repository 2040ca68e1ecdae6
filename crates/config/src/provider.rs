//! DNS provider credential shapes.
//!
//! Settings persist provider credentials as a flat field set per provider id,
//! for example:
//!
//! ```json
//! "dns_providers": {
//!     "cloudflare": { "api_token": "..." },
//!     "route53": { "access_key_id": "...", "secret_access_key": "...", "region": "us-east-1" }
//! }
//! ```
//!
//! The field names identify the credential shape, so [`ProviderConfig`] is
//! recognized structurally when the settings are parsed. Anything that does not
//! match a known shape is kept verbatim as [`ProviderConfig::Generic`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Replacement for secret values in externally visible settings.
pub const MASK_SENTINEL: &str = "***masked***";

/// Field names that hold secrets and are masked in external views.
pub const SECRET_FIELDS: &[&str] = &[
    "api_token",
    "api_key",
    "token",
    "secret_access_key",
    "client_secret",
    "service_account_key",
    "application_key",
    "application_secret",
    "consumer_key",
    "secret_key",
    "secret",
    "password",
    "tsig_secret",
];

/// Flat field set as stored on disk and exchanged with the API layer.
pub type ProviderFields = BTreeMap<String, String>;

/// Credentials for one DNS provider, one variant per credential shape.
///
/// Variants are tried in declaration order and every shape rejects unknown
/// fields, so a field set matches at most one dedicated shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    /// Service principal (Azure)
    ServicePrincipal(ServicePrincipalCredentials),
    /// Application key set (OVH)
    Application(ApplicationCredentials),
    /// RFC2136 TSIG key
    Tsig(TsigCredentials),
    /// Access key pair (Route53)
    AccessKey(AccessKeyCredentials),
    /// Service account (Google Cloud DNS)
    ServiceAccount(ServiceAccountCredentials),
    /// API endpoint plus key (PowerDNS)
    ApiEndpoint(ApiEndpointCredentials),
    /// Username plus API key (Namecheap)
    UsernameKey(UsernameKeyCredentials),
    /// Username plus password (Hurricane Electric)
    UsernamePassword(UsernamePasswordCredentials),
    /// API key plus secret key (DNS Made Easy, Porkbun)
    KeySecret(KeySecretCredentials),
    /// API key plus secret (GoDaddy)
    KeyAndSecret(KeyAndSecretCredentials),
    /// Single API token (Cloudflare, DigitalOcean, Gandi, Hetzner)
    ApiToken(ApiTokenCredentials),
    /// Single API key (Linode, Vultr, NS1)
    ApiKey(ApiKeyCredentials),
    /// Single bare token (Dynu)
    Token(TokenCredentials),
    /// Any other field set
    Generic(ProviderFields),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicePrincipalCredentials {
    pub subscription_id: String,
    pub resource_group: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationCredentials {
    pub endpoint: String,
    pub application_key: String,
    pub application_secret: String,
    pub consumer_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TsigCredentials {
    pub nameserver: String,
    pub tsig_key: String,
    pub tsig_secret: String,
    #[serde(default = "default_tsig_algorithm")]
    pub tsig_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessKeyCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceAccountCredentials {
    pub project_id: String,
    pub service_account_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiEndpointCredentials {
    pub api_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsernameKeyCredentials {
    pub username: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsernamePasswordCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySecretCredentials {
    pub api_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyAndSecretCredentials {
    pub api_key: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiTokenCredentials {
    pub api_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyCredentials {
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenCredentials {
    pub token: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_tsig_algorithm() -> String {
    "HMAC-SHA512".to_string()
}

impl ProviderConfig {
    /// Build a config from a flat field set, recognizing its shape.
    pub fn from_fields(fields: ProviderFields) -> Self {
        let object = fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>();
        serde_json::from_value(Value::Object(object)).unwrap_or(ProviderConfig::Generic(fields))
    }

    /// Flatten into the field set representation.
    pub fn to_fields(&self) -> ProviderFields {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) => Some((k, s)),
                    _ => None,
                })
                .collect(),
            _ => ProviderFields::new(),
        }
    }

    /// Value of a single field, if present.
    pub fn get(&self, field: &str) -> Option<String> {
        self.to_fields().remove(field)
    }

    /// Whether the named field is present and non-empty.
    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some_and(|v| !v.is_empty())
    }

    /// Name of the credential shape, for logs and provider listings.
    pub fn shape(&self) -> &'static str {
        match self {
            ProviderConfig::ServicePrincipal(_) => "service_principal",
            ProviderConfig::Application(_) => "application",
            ProviderConfig::Tsig(_) => "tsig",
            ProviderConfig::AccessKey(_) => "access_key",
            ProviderConfig::ServiceAccount(_) => "service_account",
            ProviderConfig::ApiEndpoint(_) => "api_endpoint",
            ProviderConfig::UsernameKey(_) => "username_key",
            ProviderConfig::UsernamePassword(_) => "username_password",
            ProviderConfig::KeySecret(_) => "key_secret",
            ProviderConfig::KeyAndSecret(_) => "key_and_secret",
            ProviderConfig::ApiToken(_) => "api_token",
            ProviderConfig::ApiKey(_) => "api_key",
            ProviderConfig::Token(_) => "token",
            ProviderConfig::Generic(_) => "generic",
        }
    }

    /// Field set with every non-empty secret replaced by [`MASK_SENTINEL`].
    pub fn masked(&self) -> ProviderFields {
        self.to_fields()
            .into_iter()
            .map(|(k, v)| {
                if !v.is_empty() && SECRET_FIELDS.contains(&k.as_str()) {
                    (k, MASK_SENTINEL.to_string())
                } else {
                    (k, v)
                }
            })
            .collect()
    }

    /// Merge an incoming field set over this config.
    ///
    /// Empty values and the mask sentinel are ignored so that a masked view
    /// posted back unchanged never overwrites stored secrets.
    pub fn merged_with(&self, incoming: &ProviderFields) -> Self {
        let mut fields = self.to_fields();
        for (key, value) in incoming {
            if value.is_empty() || value == MASK_SENTINEL {
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }
        ProviderConfig::from_fields(fields)
    }
}

/// Single-token config, used for the legacy Cloudflare setting.
pub fn api_token(token: impl Into<String>) -> ProviderConfig {
    ProviderConfig::ApiToken(ApiTokenCredentials {
        api_token: token.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> ProviderFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_shapes_are_recognized() {
        let cases: &[(&[(&str, &str)], &str)] = &[
            (&[("api_token", "t")], "api_token"),
            (&[("api_key", "k")], "api_key"),
            (&[("token", "t")], "token"),
            (
                &[("access_key_id", "a"), ("secret_access_key", "s")],
                "access_key",
            ),
            (
                &[
                    ("subscription_id", "1"),
                    ("resource_group", "rg"),
                    ("tenant_id", "t"),
                    ("client_id", "c"),
                    ("client_secret", "s"),
                ],
                "service_principal",
            ),
            (
                &[("project_id", "p"), ("service_account_key", "{}")],
                "service_account",
            ),
            (&[("api_url", "u"), ("api_key", "k")], "api_endpoint"),
            (&[("username", "u"), ("api_key", "k")], "username_key"),
            (&[("username", "u"), ("password", "p")], "username_password"),
            (&[("api_key", "k"), ("secret_key", "s")], "key_secret"),
            (&[("api_key", "k"), ("secret", "s")], "key_and_secret"),
            (
                &[("nameserver", "ns"), ("tsig_key", "k"), ("tsig_secret", "s")],
                "tsig",
            ),
            (&[("zone", "z"), ("api_key", "k")], "generic"),
        ];

        for (pairs, shape) in cases {
            let config = ProviderConfig::from_fields(fields(pairs));
            assert_eq!(config.shape(), *shape, "fields {:?}", pairs);
        }
    }

    #[test]
    fn test_optional_fields_get_defaults() {
        let config = ProviderConfig::from_fields(fields(&[
            ("access_key_id", "a"),
            ("secret_access_key", "s"),
        ]));
        assert_eq!(config.get("region").as_deref(), Some("us-east-1"));

        let config = ProviderConfig::from_fields(fields(&[
            ("nameserver", "ns"),
            ("tsig_key", "k"),
            ("tsig_secret", "s"),
        ]));
        assert_eq!(config.get("tsig_algorithm").as_deref(), Some("HMAC-SHA512"));
    }

    #[test]
    fn test_json_roundtrip_keeps_field_names() {
        let json = r#"{"access_key_id":"AKIA","secret_access_key":"s3cr3t","region":"eu-west-1"}"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.shape(), "access_key");
        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["region"], "eu-west-1");
        assert_eq!(back["secret_access_key"], "s3cr3t");
    }

    #[test]
    fn test_masked_hides_only_secrets() {
        let config = ProviderConfig::from_fields(fields(&[
            ("access_key_id", "AKIA"),
            ("secret_access_key", "s3cr3t"),
            ("region", "eu-west-1"),
        ]));
        let masked = config.masked();
        assert_eq!(masked["secret_access_key"], MASK_SENTINEL);
        assert_eq!(masked["access_key_id"], "AKIA");
        assert_eq!(masked["region"], "eu-west-1");

        let empty = api_token("");
        assert_eq!(empty.masked()["api_token"], "");
    }

    #[test]
    fn test_merge_ignores_masked_and_empty_values() {
        let stored = api_token("real-token");
        let merged = stored.merged_with(&fields(&[("api_token", MASK_SENTINEL)]));
        assert_eq!(merged.get("api_token").as_deref(), Some("real-token"));

        let merged = stored.merged_with(&fields(&[("api_token", "")]));
        assert_eq!(merged.get("api_token").as_deref(), Some("real-token"));

        let merged = stored.merged_with(&fields(&[("api_token", "new-token")]));
        assert_eq!(merged.get("api_token").as_deref(), Some("new-token"));
    }

    #[test]
    fn test_has_requires_non_empty() {
        assert!(!api_token("").has("api_token"));
        // Whitespace is a value; it is not trimmed away
        assert!(api_token("  ").has("api_token"));
        assert!(!api_token("x").has("missing"));
        assert!(api_token("x").has("api_token"));
    }
}
