//! Certificate lifecycle over an external ACME client
//!
//! The ACME protocol and DNS record changes are delegated to certbot and its
//! DNS plugins. This module prepares each run, executes it, and harvests the
//! results.
//!
//! # Architecture
//!
//! - [`CertificateOrchestrator`] - Validates requests, writes provider
//!   credentials, runs the client, installs the artifacts
//! - [`AcmeRunner`] - Seam over the client process ([`CertbotRunner`] in
//!   production)
//! - [`CertificateStore`] - Per-domain artifact directories
//! - [`RenewalScheduler`] - Cron-driven renewal sweeps
//!
//! # Issuance Flow
//!
//! 1. Domain and email are validated; the DNS provider is resolved
//! 2. Provider credentials are written to `acme_dir/<domain>/credentials`
//! 3. certbot runs with per-domain `config`, `work` and `logs` directories
//! 4. On success the four PEM files are copied from `config/live/<domain>`
//!    into the certificate store
//!
//! Steps 1 and 2 happen before anything runs in the background, so a bad
//! request fails immediately.

mod error;
mod orchestrator;
mod runner;
mod scheduler;
mod storage;

pub use error::{CertError, ScheduleError, StorageError};
pub use orchestrator::{AcmeDirs, CertificateOrchestrator, CertificateState, Operation, PreparedRun};
pub use runner::{AcmeRunner, CertbotRunner, RunError, RunOutput};
pub use scheduler::{RenewalScheduler, SchedulerHandle, SweepReport, DEFAULT_SCHEDULE};
pub use storage::{CertificateStore, ARTIFACT_FILES, CERT_FILE, CHAIN_FILE, FULLCHAIN_FILE, PRIVKEY_FILE};
