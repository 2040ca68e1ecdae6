//! Certificate Lifecycle Integration Tests
//!
//! Drive issuance, inspection and scheduled renewal end to end against a stub
//! certbot that publishes real (self-signed) certificates into its `live`
//! directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tempfile::TempDir;

use certmate::acme::{
    AcmeRunner, CertError, CertificateOrchestrator, CertificateStore, RenewalScheduler, RunError, RunOutput,
    ARTIFACT_FILES, DEFAULT_SCHEDULE,
};
use certmate::inspect::CertificateInspector;
use certmate::providers::{ProviderError, ProviderRegistry};
use certmate_config::{DomainEntry, ProviderFields, Settings, SettingsStore, SettingsUpdate};

// ============================================================================
// Test Utilities
// ============================================================================

/// PEM certificate for `domain` expiring at midnight UTC `days` from today
fn certificate_expiring_in(domain: &str, days: i64) -> (String, String) {
    let expiry = Utc::now() + chrono::Duration::days(days);
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::new(vec![domain.to_string(), format!("*.{domain}")]).unwrap();
    params.not_before = rcgen::date_time_ymd(2024, 1, 1);
    params.not_after = rcgen::date_time_ymd(expiry.year(), expiry.month() as u8, expiry.day() as u8);
    let cert = params.self_signed(&key_pair).unwrap();
    (cert.pem(), key_pair.serialize_pem())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

/// Certbot stand-in: records invocations and publishes a certificate into
/// `<config-dir>/live/<cert-name>`
#[derive(Debug)]
struct StubCertbot {
    calls: AtomicUsize,
    args: Mutex<Vec<Vec<String>>>,
    valid_days: AtomicI64,
    /// Certificate name whose runs exit non-zero without publishing
    failing: Mutex<Option<String>>,
}

impl StubCertbot {
    fn new(valid_days: i64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            args: Mutex::new(Vec::new()),
            valid_days: AtomicI64::new(valid_days),
            failing: Mutex::new(None),
        })
    }

    fn fail_for(&self, domain: &str) {
        *self.failing.lock().unwrap() = Some(domain.to_string());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AcmeRunner for StubCertbot {
    fn program(&self) -> &str {
        "stub-certbot"
    }

    async fn run(&self, args: &[String]) -> Result<RunOutput, RunError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.args.lock().unwrap().push(args.to_vec());

        let config_dir = PathBuf::from(arg_value(args, "--config-dir").unwrap());
        let name = arg_value(args, "--cert-name").unwrap();
        if self.failing.lock().unwrap().as_deref() == Some(name) {
            return Ok(RunOutput {
                code: Some(1),
                stderr: "DNS problem: NXDOMAIN looking up TXT".to_string(),
                ..RunOutput::default()
            });
        }

        let live = config_dir.join("live").join(name);
        fs::create_dir_all(&live).unwrap();

        let (cert, key) = certificate_expiring_in(name, self.valid_days.load(Ordering::SeqCst));
        fs::write(live.join("cert.pem"), &cert).unwrap();
        fs::write(live.join("chain.pem"), &cert).unwrap();
        fs::write(live.join("fullchain.pem"), format!("{cert}{cert}")).unwrap();
        fs::write(live.join("privkey.pem"), key).unwrap();

        Ok(RunOutput {
            code: Some(0),
            ..RunOutput::default()
        })
    }
}

struct Harness {
    temp: TempDir,
    settings: SettingsStore,
    runner: Arc<StubCertbot>,
    orchestrator: CertificateOrchestrator,
    inspector: CertificateInspector,
}

impl Harness {
    fn new(valid_days: i64) -> Self {
        let temp = TempDir::new().unwrap();
        let settings = SettingsStore::new(temp.path().join("data/settings.json"));
        let store = CertificateStore::new(&temp.path().join("certificates")).unwrap();
        let runner = StubCertbot::new(valid_days);
        let orchestrator = CertificateOrchestrator::new(
            Arc::new(ProviderRegistry::new()),
            runner.clone(),
            store.clone(),
            temp.path().join("letsencrypt"),
            2,
        );

        fs::create_dir_all(temp.path().join("data")).unwrap();

        Self {
            temp,
            settings,
            runner,
            orchestrator,
            inspector: CertificateInspector::new(store),
        }
    }

    fn cert_dir(&self) -> PathBuf {
        self.temp.path().join("certificates")
    }

    fn acme_dir(&self) -> PathBuf {
        self.temp.path().join("letsencrypt")
    }

    /// Save settings with a configured Cloudflare account and the given domains
    fn configure(&self, domains: &[&str]) -> Settings {
        let mut settings = self.settings.load();
        settings.apply(SettingsUpdate {
            email: Some("ops@example.org".to_string()),
            dns_provider: Some("cloudflare".to_string()),
            dns_providers: Some(BTreeMap::from([(
                "cloudflare".to_string(),
                ProviderFields::from([("api_token".to_string(), "cf-test-token".to_string())]),
            )])),
            ..SettingsUpdate::default()
        });
        settings.domains = domains
            .iter()
            .map(|domain| DomainEntry::new(*domain, "cloudflare"))
            .collect();
        self.settings.save(&settings).unwrap()
    }

    fn scheduler(&self) -> RenewalScheduler {
        RenewalScheduler::from_expression(
            self.settings.clone(),
            self.inspector.clone(),
            self.orchestrator.clone(),
            DEFAULT_SCHEDULE,
        )
        .unwrap()
    }
}

fn is_empty_or_missing(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

// ============================================================================
// Issuance
// ============================================================================

#[tokio::test]
async fn test_create_installs_artifacts() {
    let harness = Harness::new(90);
    harness.configure(&["example.org"]);
    let settings = harness.settings.load();

    harness
        .orchestrator
        .create("example.org", &settings.email, None, &settings)
        .await
        .unwrap();

    let domain_dir = harness.cert_dir().join("example.org");
    for file in ARTIFACT_FILES {
        assert!(domain_dir.join(file).is_file(), "{file} missing");
    }

    let record = harness.inspector.inspect("example.org", &settings);
    assert!(record.exists);
    assert!(!record.needs_renewal);
    assert_eq!(record.dns_provider.as_deref(), Some("cloudflare"));

    let calls = harness.runner.args.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "certonly");
    assert!(calls[0].contains(&"*.example.org".to_string()));

    let credentials = fs::read_to_string(harness.acme_dir().join("example.org/credentials/cloudflare.ini")).unwrap();
    assert_eq!(credentials, "dns_cloudflare_api_token = cf-test-token\n");
}

#[tokio::test]
async fn test_unconfigured_provider_fails_synchronously() {
    let harness = Harness::new(90);
    let settings = harness.settings.load();

    let err = harness
        .orchestrator
        .spawn_create("example.org", "ops@example.org", None, &settings)
        .unwrap_err();

    match err {
        CertError::Configuration(ProviderError::MissingCredentials { provider, missing }) => {
            assert_eq!(provider, "cloudflare");
            assert_eq!(missing, vec!["api_token".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(harness.runner.calls(), 0);
    assert_eq!(harness.orchestrator.tracker().active_count(), 0);
    assert!(is_empty_or_missing(&harness.cert_dir()));
    assert!(is_empty_or_missing(&harness.acme_dir()));
}

#[tokio::test]
async fn test_background_create_completes() {
    let harness = Harness::new(90);
    let settings = harness.configure(&["example.org"]);

    harness
        .orchestrator
        .spawn_create("example.org", "ops@example.org", None, &settings)
        .unwrap();

    assert!(
        harness
            .orchestrator
            .tracker()
            .wait_for_drain(Duration::from_secs(10))
            .await
    );
    assert_eq!(harness.runner.calls(), 1);
    assert!(harness.inspector.inspect("example.org", &settings).exists);
}

// ============================================================================
// Inspection
// ============================================================================

#[tokio::test]
async fn test_renewal_threshold() {
    let harness = Harness::new(10);
    let settings = harness.configure(&["soon.example.org"]);
    harness
        .orchestrator
        .create("soon.example.org", "ops@example.org", None, &settings)
        .await
        .unwrap();

    harness.runner.valid_days.store(100, Ordering::SeqCst);
    harness
        .orchestrator
        .create("later.example.org", "ops@example.org", None, &settings)
        .await
        .unwrap();

    let soon = harness.inspector.inspect("soon.example.org", &settings);
    assert!(soon.exists);
    assert!(soon.needs_renewal);

    let later = harness.inspector.inspect("later.example.org", &settings);
    assert!(later.exists);
    assert!(!later.needs_renewal);
}

// ============================================================================
// Scheduled Renewal
// ============================================================================

#[tokio::test]
async fn test_sweep_renews_only_expiring_certificates() {
    let harness = Harness::new(10);
    let settings = harness.configure(&["soon.example.org", "later.example.org", "missing.example.org"]);

    harness
        .orchestrator
        .create("soon.example.org", "ops@example.org", None, &settings)
        .await
        .unwrap();
    harness.runner.valid_days.store(100, Ordering::SeqCst);
    harness
        .orchestrator
        .create("later.example.org", "ops@example.org", None, &settings)
        .await
        .unwrap();
    assert_eq!(harness.runner.calls(), 2);

    harness.runner.valid_days.store(90, Ordering::SeqCst);
    let report = harness.scheduler().run_sweep().await;

    assert_eq!(report.checked, 3);
    assert_eq!(report.renewed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(harness.runner.calls(), 3);

    let renew_args = harness.runner.args.lock().unwrap().last().cloned().unwrap();
    assert_eq!(renew_args[0], "renew");
    assert!(renew_args.contains(&"soon.example.org".to_string()));

    assert!(!harness.inspector.inspect("soon.example.org", &settings).needs_renewal);
}

#[tokio::test]
async fn test_sweep_respects_auto_renew() {
    let harness = Harness::new(10);
    let mut settings = harness.configure(&["soon.example.org"]);
    harness
        .orchestrator
        .create("soon.example.org", "ops@example.org", None, &settings)
        .await
        .unwrap();

    settings.auto_renew = false;
    harness.settings.save(&settings).unwrap();

    let report = harness.scheduler().run_sweep().await;
    assert_eq!(report.checked, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(harness.runner.calls(), 1);
}

#[tokio::test]
async fn test_sweep_continues_after_failed_renewal() {
    let harness = Harness::new(10);
    let settings = harness.configure(&["broken.example.org", "soon.example.org"]);
    for domain in ["broken.example.org", "soon.example.org"] {
        harness
            .orchestrator
            .create(domain, "ops@example.org", None, &settings)
            .await
            .unwrap();
    }

    harness.runner.valid_days.store(90, Ordering::SeqCst);
    harness.runner.fail_for("broken.example.org");
    let report = harness.scheduler().run_sweep().await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.renewed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(harness.runner.calls(), 4);

    assert!(harness.inspector.inspect("broken.example.org", &settings).needs_renewal);
    assert!(!harness.inspector.inspect("soon.example.org", &settings).needs_renewal);
}

#[tokio::test]
async fn test_failed_renewal_keeps_installed_certificate() {
    let harness = Harness::new(10);
    let settings = harness.configure(&["example.org"]);
    harness
        .orchestrator
        .create("example.org", "ops@example.org", None, &settings)
        .await
        .unwrap();

    let domain_dir = harness.cert_dir().join("example.org");
    let before: Vec<Vec<u8>> = ARTIFACT_FILES
        .iter()
        .map(|file| fs::read(domain_dir.join(file)).unwrap())
        .collect();

    harness.runner.valid_days.store(90, Ordering::SeqCst);
    harness.runner.fail_for("example.org");
    let err = harness.orchestrator.renew("example.org").await.unwrap_err();

    match err {
        CertError::ExternalTool { domain, diagnostic } => {
            assert_eq!(domain, "example.org");
            assert!(diagnostic.contains("NXDOMAIN"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let after: Vec<Vec<u8>> = ARTIFACT_FILES
        .iter()
        .map(|file| fs::read(domain_dir.join(file)).unwrap())
        .collect();
    assert_eq!(before, after);

    let record = harness.inspector.inspect("example.org", &settings);
    assert!(record.exists);
    assert!(record.needs_renewal);
}
