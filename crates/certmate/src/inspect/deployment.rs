//! Live deployment check over TLS

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use serde::Serialize;
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::TlsConnector;
use tracing::{debug, info};
use x509_parser::extensions::GeneralName;

use super::parse_expiry;
use crate::acme::CertificateStore;

/// Reported in [`DeploymentStatus::method`]
pub const DEPLOYMENT_METHOD: &str = "tls-direct";

const HTTPS_PORT: u16 = 443;

/// What a domain's public TLS endpoint is serving
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStatus {
    pub domain: String,
    /// A certificate was retrieved from the endpoint
    pub deployed: bool,
    pub reachable: bool,
    /// The served certificate names the domain
    pub certificate_match: bool,
    /// Subject CN followed by DNS SANs
    pub certificate_domains: Vec<String>,
    pub issuer: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// `dns_resolution_failed`, `timeout`, `connection_failed` or `tls_error: ...`
    pub error: Option<String>,
    pub method: &'static str,
    pub checked_at: DateTime<Utc>,
    pub has_local_cert: bool,
    pub local_cert_expires: Option<DateTime<Utc>>,
}

impl DeploymentStatus {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            deployed: false,
            reachable: false,
            certificate_match: false,
            certificate_domains: Vec::new(),
            issuer: None,
            expires_at: None,
            error: None,
            method: DEPLOYMENT_METHOD,
            checked_at: Utc::now(),
            has_local_cert: false,
            local_cert_expires: None,
        }
    }

    fn failed(mut self, reachable: bool, error: impl Into<String>) -> Self {
        self.reachable = reachable;
        self.error = Some(error.into());
        self
    }
}

/// Whether a certificate name covers `domain`
///
/// Exact match, or a `*.` wildcard covering exactly one extra label.
/// Comparison is case-insensitive.
pub fn name_matches(cert_name: &str, domain: &str) -> bool {
    let cert_name = cert_name.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();

    if cert_name == domain {
        return true;
    }

    match cert_name.strip_prefix("*.") {
        Some(suffix) => match domain.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        },
        None => false,
    }
}

/// Served leaf certificate details
struct PeerCertificate {
    names: Vec<String>,
    issuer: String,
    expires_at: Option<DateTime<Utc>>,
}

fn describe_peer(der: &[u8]) -> Option<PeerCertificate> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;

    let mut names: Vec<String> = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .map(str::to_string)
        .collect();

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                names.push(dns.to_string());
            }
        }
    }

    let not_after = cert.validity().not_after.to_datetime().unix_timestamp();

    Some(PeerCertificate {
        names,
        issuer: cert.issuer().to_string(),
        expires_at: DateTime::<Utc>::from_timestamp(not_after, 0),
    })
}

fn tls_connector() -> TlsConnector {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Probe `domain:443` and report the certificate it serves
///
/// `timeout` bounds the TCP connect and the TLS handshake separately.
/// Local store information is attached when `store` holds a certificate
/// for the domain.
pub async fn check_deployment(domain: &str, timeout: Duration, store: Option<&CertificateStore>) -> DeploymentStatus {
    let mut status = probe(domain, HTTPS_PORT, timeout).await;

    if let Some(store) = store {
        if let Ok(contents) = tokio::fs::read(store.cert_path(domain)).await {
            if let Ok(expires) = parse_expiry(&contents) {
                status.has_local_cert = true;
                status.local_cert_expires = Some(expires);
            }
        }
    }

    info!(
        domain = %domain,
        deployed = status.deployed,
        certificate_match = status.certificate_match,
        error = status.error.as_deref().unwrap_or(""),
        "Checked certificate deployment"
    );

    status
}

async fn probe(domain: &str, port: u16, timeout: Duration) -> DeploymentStatus {
    let status = DeploymentStatus::new(domain);

    let addrs: Vec<_> = match lookup_host((domain, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!(domain = %domain, error = %e, "Name resolution failed");
            return status.failed(false, "dns_resolution_failed");
        }
    };
    if addrs.is_empty() {
        return status.failed(false, "dns_resolution_failed");
    }

    let tcp = match connect_any(domain, &addrs, timeout).await {
        Ok(tcp) => tcp,
        Err(reason) => return status.failed(false, reason),
    };

    let server_name = match ServerName::try_from(domain.to_string()) {
        Ok(name) => name,
        Err(e) => return status.failed(true, format!("tls_error: {e}")),
    };

    let tls = match tokio::time::timeout(timeout, tls_connector().connect(server_name, tcp)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => return status.failed(true, format!("tls_error: {e}")),
        Err(_) => return status.failed(true, "timeout"),
    };

    let (_, session) = tls.get_ref();
    let Some(leaf) = session.peer_certificates().and_then(|certs| certs.first()) else {
        return status.failed(true, "tls_error: no certificate presented");
    };
    let Some(peer) = describe_peer(leaf.as_ref()) else {
        return status.failed(true, "tls_error: unparsable certificate");
    };

    DeploymentStatus {
        deployed: true,
        reachable: true,
        certificate_match: peer.names.iter().any(|name| name_matches(name, domain)),
        certificate_domains: peer.names,
        issuer: Some(peer.issuer),
        expires_at: peer.expires_at,
        ..status
    }
}

/// Connect to the first address that accepts, trying each in order
///
/// Each attempt gets its own `timeout`. On total failure the reason of the
/// last attempt is returned.
async fn connect_any(domain: &str, addrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream, &'static str> {
    let mut reason = "connection_failed";

    for addr in addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(*addr)).await {
            Ok(Ok(tcp)) => return Ok(tcp),
            Ok(Err(e)) => {
                debug!(domain = %domain, %addr, error = %e, "Connection failed");
                reason = "connection_failed";
            }
            Err(_) => {
                debug!(domain = %domain, %addr, "Connection timed out");
                reason = "timeout";
            }
        }
    }

    Err(reason)
}
