//! CertMate
//!
//! DNS-01 certificate automation for self-hosted operators.
//!
//! This library provides:
//!
//! - **Providers**: Turn per-provider DNS credentials into certbot plugin
//!   configuration
//! - **ACME**: Drive certbot through issuance and renewal and harvest the
//!   artifacts into a certificate store
//! - **Scheduling**: Cron-driven renewal sweeps with graceful shutdown
//! - **Inspection**: Expiry status of stored certificates and live
//!   deployment checks over TLS
//! - **Authorization**: Bearer-token guard for exposed operations
//!
//! Settings persistence lives in `certmate-config`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certmate::acme::{CertbotRunner, CertificateOrchestrator, CertificateStore};
//! use certmate::providers::ProviderRegistry;
//!
//! let store = CertificateStore::new(&config.cert_dir)?;
//! let orchestrator = CertificateOrchestrator::new(
//!     Arc::new(ProviderRegistry::new()),
//!     Arc::new(CertbotRunner::new("certbot")),
//!     store,
//!     &config.acme_dir,
//!     config.max_workers,
//! );
//! orchestrator.create("example.org", "ops@example.org", None, &settings).await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod auth;
pub mod inspect;
pub mod providers;
pub mod workers;

// ============================================================================
// Public API Re-exports
// ============================================================================

pub use acme::{CertError, CertificateOrchestrator, CertificateStore, RenewalScheduler, SchedulerHandle, SweepReport};
pub use auth::{authorize, authorize_or_setup, AuthError};
pub use inspect::{check_deployment, CertificateInspector, CertificateRecord, DeploymentStatus};
pub use providers::{DnsProvider, ProviderError, ProviderRegistry};
pub use workers::WorkTracker;
