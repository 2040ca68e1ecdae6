//! Certificate inspection
//!
//! Reads stored certificates to compute expiry and renewal status, and probes
//! live TLS endpoints to confirm what is actually being served.

mod deployment;

pub use deployment::{check_deployment, name_matches, DeploymentStatus, DEPLOYMENT_METHOD};

use std::fs;

use chrono::{DateTime, Utc};
use certmate_config::Settings;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::acme::CertificateStore;

/// Certificates with fewer days left than this are due for renewal
pub const RENEWAL_THRESHOLD_DAYS: i64 = 30;

const SECONDS_PER_DAY: i64 = 86_400;

/// Expiry and renewal status of a stored certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    pub domain: String,
    pub exists: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    /// Whole days until expiry, floored; negative once expired
    pub days_until_expiry: Option<i64>,
    pub needs_renewal: bool,
    pub dns_provider: Option<String>,
}

impl CertificateRecord {
    /// Record for a domain with no readable certificate
    pub fn absent(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            exists: false,
            expiry_date: None,
            days_until_expiry: None,
            needs_renewal: false,
            dns_provider: None,
        }
    }
}

#[derive(Debug, Error)]
enum ParseError {
    #[error("invalid PEM: {0}")]
    Pem(#[from] pem::PemError),

    #[error("invalid X.509 certificate: {0}")]
    X509(String),

    #[error("expiry out of range")]
    Expiry,
}

/// Read the `notAfter` instant of a PEM certificate
fn parse_expiry(pem_bytes: &[u8]) -> Result<DateTime<Utc>, ParseError> {
    let pem = pem::parse(pem_bytes)?;
    let (_, cert) = x509_parser::parse_x509_certificate(pem.contents())
        .map_err(|e| ParseError::X509(e.to_string()))?;

    let not_after = cert.validity().not_after.to_datetime().unix_timestamp();
    DateTime::<Utc>::from_timestamp(not_after, 0).ok_or(ParseError::Expiry)
}

/// Whole days from `now` until `expiry`, rounded toward negative infinity
pub fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Computes certificate status from the store
#[derive(Debug, Clone)]
pub struct CertificateInspector {
    store: CertificateStore,
}

impl CertificateInspector {
    pub fn new(store: CertificateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// Status of a domain's stored certificate
    pub fn inspect(&self, domain: &str, settings: &Settings) -> CertificateRecord {
        self.inspect_at(domain, settings, Utc::now())
    }

    /// Status of a domain's stored certificate as of `now`
    pub fn inspect_at(&self, domain: &str, settings: &Settings, now: DateTime<Utc>) -> CertificateRecord {
        let cert_path = self.store.cert_path(domain);

        let contents = match fs::read(&cert_path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(domain = %domain, error = %e, "No stored certificate");
                return CertificateRecord::absent(domain);
            }
        };

        let expiry = match parse_expiry(&contents) {
            Ok(expiry) => expiry,
            Err(e) => {
                warn!(
                    domain = %domain,
                    path = %cert_path.display(),
                    error = %e,
                    "Stored certificate is unreadable"
                );
                return CertificateRecord::absent(domain);
            }
        };

        let days = days_until(expiry, now);

        CertificateRecord {
            domain: domain.to_string(),
            exists: true,
            expiry_date: Some(expiry),
            days_until_expiry: Some(days),
            needs_renewal: days < RENEWAL_THRESHOLD_DAYS,
            dns_provider: Some(settings.provider_for(domain).to_string()),
        }
    }
}
