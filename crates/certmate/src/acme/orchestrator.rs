//! Certificate lifecycle orchestration
//!
//! Drives the ACME client through issuance and renewal for one domain at a
//! time and harvests the results into the [`CertificateStore`].
//!
//! # Per-domain state
//!
//! ```text
//! absent  --create--> issuing  --ok--> issued
//!                              --err-> absent
//! issued  --renew-->  renewing --ok--> issued
//!                              --err-> issued-stale (previous artifacts kept)
//! ```
//!
//! Each domain gets its own ACME client state under
//! `acme_dir/<domain>/{config,work,logs}` and its own credential directory
//! `acme_dir/<domain>/credentials`. Operations on the same domain are not
//! serialized; overlapping runs are logged.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use certmate_common::{validate_domain, validate_email};
use certmate_config::Settings;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::error::{CertError, StorageError};
use super::runner::{AcmeRunner, RunError};
use super::storage::CertificateStore;
use crate::providers::{ensure_private_dir, ProviderRegistry};
use crate::workers::WorkTracker;

/// Lifecycle state of a domain's certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateState {
    Absent,
    Issuing,
    Issued,
    Renewing,
    IssuedStale,
}

impl fmt::Display for CertificateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CertificateState::Absent => "absent",
            CertificateState::Issuing => "issuing",
            CertificateState::Issued => "issued",
            CertificateState::Renewing => "renewing",
            CertificateState::IssuedStale => "issued-stale",
        })
    }
}

/// Kind of certificate operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Renew,
}

impl Operation {
    fn running_state(self) -> CertificateState {
        match self {
            Operation::Create => CertificateState::Issuing,
            Operation::Renew => CertificateState::Renewing,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Renew => "renew",
        })
    }
}

/// ACME client directories for one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmeDirs {
    pub root: PathBuf,
    pub config: PathBuf,
    pub work: PathBuf,
    pub logs: PathBuf,
    pub credentials: PathBuf,
}

impl AcmeDirs {
    pub fn for_domain(acme_dir: &Path, domain: &str) -> Self {
        let root = acme_dir.join(domain);
        Self {
            config: root.join("config"),
            work: root.join("work"),
            logs: root.join("logs"),
            credentials: root.join("credentials"),
            root,
        }
    }

    /// Directory where the ACME client publishes the current lineage
    pub fn live(&self, domain: &str) -> PathBuf {
        self.config.join("live").join(domain)
    }

    fn create(&self) -> Result<(), StorageError> {
        ensure_private_dir(&self.root)?;
        for dir in [&self.config, &self.work, &self.logs] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn dir_args(&self) -> Vec<String> {
        vec![
            "--config-dir".to_string(),
            self.config.display().to_string(),
            "--work-dir".to_string(),
            self.work.display().to_string(),
            "--logs-dir".to_string(),
            self.logs.display().to_string(),
        ]
    }
}

/// A validated operation, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRun {
    pub domain: String,
    pub operation: Operation,
    pub dirs: AcmeDirs,
    pub args: Vec<String>,
}

/// Drives certificate issuance and renewal
#[derive(Clone)]
pub struct CertificateOrchestrator {
    registry: Arc<ProviderRegistry>,
    runner: Arc<dyn AcmeRunner>,
    store: CertificateStore,
    acme_dir: PathBuf,
    /// Bounds concurrent background operations
    workers: Arc<Semaphore>,
    max_workers: usize,
    /// Running operations per domain
    in_flight: Arc<DashMap<String, usize>>,
    tracker: WorkTracker,
}

impl CertificateOrchestrator {
    /// Create an orchestrator
    ///
    /// # Arguments
    ///
    /// * `registry` - DNS provider lookup table
    /// * `runner` - ACME client runner
    /// * `store` - Certificate store receiving the artifacts
    /// * `acme_dir` - Root for per-domain ACME client state
    /// * `max_workers` - Concurrent background operations (at least 1)
    pub fn new(
        registry: Arc<ProviderRegistry>,
        runner: Arc<dyn AcmeRunner>,
        store: CertificateStore,
        acme_dir: impl Into<PathBuf>,
        max_workers: usize,
    ) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            registry,
            runner,
            store,
            acme_dir: acme_dir.into(),
            workers: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            in_flight: Arc::new(DashMap::new()),
            tracker: WorkTracker::new(),
        }
    }

    /// Share an existing work tracker
    pub fn with_tracker(mut self, tracker: WorkTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Certificate store receiving the artifacts
    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// Tracker counting background operations
    pub fn tracker(&self) -> &WorkTracker {
        &self.tracker
    }

    /// ACME client directories for a domain
    pub fn dirs_for(&self, domain: &str) -> AcmeDirs {
        AcmeDirs::for_domain(&self.acme_dir, domain)
    }

    // =========================================================================
    // Preparation
    // =========================================================================

    /// Validate inputs and write provider credentials for an issuance.
    ///
    /// `provider` defaults to the domain's assigned provider. Nothing is
    /// written when validation or provider configuration fails.
    pub fn prepare_create(
        &self,
        domain: &str,
        email: &str,
        provider: Option<&str>,
        settings: &Settings,
    ) -> Result<PreparedRun, CertError> {
        let domain = validate_domain(domain)?;
        let email = validate_email(email)?;
        let provider = provider
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| settings.provider_for(&domain))
            .to_string();

        let dirs = self.dirs_for(&domain);
        let challenge = self
            .registry
            .materialize(&provider, settings, &dirs.credentials)?;

        let mut args = vec!["certonly".to_string()];
        args.extend(dirs.dir_args());
        args.push(format!("--dns-{}", challenge.plugin));
        args.extend(challenge.args);
        args.extend([
            "--email".to_string(),
            email,
            "--agree-tos".to_string(),
            "--non-interactive".to_string(),
            "--cert-name".to_string(),
            domain.clone(),
            "-d".to_string(),
            domain.clone(),
            "-d".to_string(),
            format!("*.{domain}"),
        ]);

        debug!(domain = %domain, provider = %provider, "Prepared certificate issuance");

        Ok(PreparedRun {
            domain,
            operation: Operation::Create,
            dirs,
            args,
        })
    }

    /// Validate inputs for a renewal.
    pub fn prepare_renew(&self, domain: &str) -> Result<PreparedRun, CertError> {
        let domain = validate_domain(domain)?;
        let dirs = self.dirs_for(&domain);

        let mut args = vec!["renew".to_string()];
        args.extend(dirs.dir_args());
        args.extend([
            "--cert-name".to_string(),
            domain.clone(),
            "--non-interactive".to_string(),
            "--quiet".to_string(),
        ]);

        Ok(PreparedRun {
            domain,
            operation: Operation::Renew,
            dirs,
            args,
        })
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Issue a certificate for `domain` and `*.domain` and wait for the result
    pub async fn create(
        &self,
        domain: &str,
        email: &str,
        provider: Option<&str>,
        settings: &Settings,
    ) -> Result<(), CertError> {
        let prepared = self.prepare_create(domain, email, provider, settings)?;
        self.execute(prepared).await
    }

    /// Renew a domain's certificate and wait for the result
    pub async fn renew(&self, domain: &str) -> Result<(), CertError> {
        let prepared = self.prepare_renew(domain)?;
        self.execute(prepared).await
    }

    /// Validate and prepare synchronously, then issue in the background.
    ///
    /// Returning `Ok` only means the operation started; the outcome is
    /// logged.
    pub fn spawn_create(
        &self,
        domain: &str,
        email: &str,
        provider: Option<&str>,
        settings: &Settings,
    ) -> Result<(), CertError> {
        let prepared = self.prepare_create(domain, email, provider, settings)?;
        self.spawn(prepared);
        Ok(())
    }

    /// Validate synchronously, then renew in the background.
    pub fn spawn_renew(&self, domain: &str) -> Result<(), CertError> {
        let prepared = self.prepare_renew(domain)?;
        self.spawn(prepared);
        Ok(())
    }

    fn spawn(&self, prepared: PreparedRun) {
        let this = self.clone();
        let guard = self.tracker.begin();

        info!(
            domain = %prepared.domain,
            operation = %prepared.operation,
            max_workers = self.max_workers,
            available_workers = self.workers.available_permits(),
            "Queued background certificate operation"
        );

        tokio::spawn(async move {
            let _guard = guard;
            let _permit = match Arc::clone(&this.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!(domain = %prepared.domain, "Worker pool closed, operation dropped");
                    return;
                }
            };

            let domain = prepared.domain.clone();
            let operation = prepared.operation;
            if let Err(e) = this.execute(prepared).await {
                error!(
                    domain = %domain,
                    operation = %operation,
                    error = %e,
                    "Background certificate operation failed"
                );
            }
        });
    }

    /// Run a prepared operation and harvest its artifacts
    pub async fn execute(&self, prepared: PreparedRun) -> Result<(), CertError> {
        let PreparedRun {
            domain,
            operation,
            dirs,
            args,
        } = prepared;

        let _in_flight = InFlight::enter(&self.in_flight, &domain, operation);
        let start = Instant::now();

        info!(
            domain = %domain,
            state = %operation.running_state(),
            "Certificate operation started"
        );

        let result = self.run_and_harvest(&domain, &dirs, &args).await;

        match &result {
            Ok(()) => info!(
                domain = %domain,
                state = %CertificateState::Issued,
                elapsed_secs = start.elapsed().as_secs(),
                "Certificate operation succeeded"
            ),
            Err(e) => error!(
                domain = %domain,
                state = %self.state_after_failure(&domain),
                elapsed_secs = start.elapsed().as_secs(),
                error = %e,
                "Certificate operation failed"
            ),
        }

        result
    }

    /// A failed operation never touches stored artifacts, so whatever was
    /// installed before is still served
    fn state_after_failure(&self, domain: &str) -> CertificateState {
        if self.store.has_certificate(domain) {
            CertificateState::IssuedStale
        } else {
            CertificateState::Absent
        }
    }

    async fn run_and_harvest(&self, domain: &str, dirs: &AcmeDirs, args: &[String]) -> Result<(), CertError> {
        dirs.create()?;

        let output = self.runner.run(args).await.map_err(|e| match e {
            RunError::Spawn { program, source } => CertError::Spawn { program, source },
            RunError::Timeout(limit) => CertError::Timeout {
                domain: domain.to_string(),
                elapsed_secs: limit.as_secs(),
            },
        })?;

        if !output.success() {
            return Err(CertError::ExternalTool {
                domain: domain.to_string(),
                diagnostic: output.diagnostic(),
            });
        }

        self.store.install_from(&dirs.live(domain), domain)?;
        Ok(())
    }
}

impl fmt::Debug for CertificateOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateOrchestrator")
            .field("runner", &self.runner.program())
            .field("store", &self.store.base_path())
            .field("acme_dir", &self.acme_dir)
            .field("max_workers", &self.max_workers)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

/// Registers a running operation for overlap detection
struct InFlight<'a> {
    map: &'a DashMap<String, usize>,
    domain: String,
}

impl<'a> InFlight<'a> {
    fn enter(map: &'a DashMap<String, usize>, domain: &str, operation: Operation) -> Self {
        let previous = {
            let mut count = map.entry(domain.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };

        if previous > 0 {
            warn!(
                domain = %domain,
                operation = %operation,
                concurrent_operations = previous,
                "Another certificate operation is already running for this domain"
            );
        }

        Self {
            map,
            domain: domain.to_string(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove_if_mut(&self.domain, |_, count| {
            *count -= 1;
            *count == 0
        });
    }
}
