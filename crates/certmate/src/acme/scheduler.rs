//! Background certificate renewal scheduler
//!
//! Sweeps every configured domain on a cron schedule and renews the
//! certificates that are close to expiry.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use certmate_config::SettingsStore;
use cron::Schedule;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::ScheduleError;
use super::orchestrator::CertificateOrchestrator;
use crate::inspect::CertificateInspector;

/// Default schedule: every day at 02:00 UTC
pub const DEFAULT_SCHEDULE: &str = "0 0 2 * * *";

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Domains inspected
    pub checked: usize,
    pub renewed: usize,
    pub failed: usize,
    /// Domains not inspected (auto-renew off, or shutdown mid-sweep)
    pub skipped: usize,
}

/// Background certificate renewal scheduler
///
/// Renewals within a sweep run one after another; a failure is logged and
/// the sweep moves on. Nothing is retried before the next firing.
pub struct RenewalScheduler {
    settings: SettingsStore,
    inspector: CertificateInspector,
    orchestrator: CertificateOrchestrator,
    schedule: Schedule,
    expression: String,
}

impl RenewalScheduler {
    /// Create a scheduler firing on [`DEFAULT_SCHEDULE`]
    pub fn new(
        settings: SettingsStore,
        inspector: CertificateInspector,
        orchestrator: CertificateOrchestrator,
    ) -> Result<Self, ScheduleError> {
        Self::from_expression(settings, inspector, orchestrator, DEFAULT_SCHEDULE)
    }

    /// Create a scheduler firing on a six-field cron expression
    /// (`sec min hour day-of-month month day-of-week`, UTC)
    pub fn from_expression(
        settings: SettingsStore,
        inspector: CertificateInspector,
        orchestrator: CertificateOrchestrator,
        expression: &str,
    ) -> Result<Self, ScheduleError> {
        let schedule = Schedule::from_str(expression).map_err(|e| ScheduleError::InvalidExpression {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        let scheduler = Self {
            settings,
            inspector,
            orchestrator,
            schedule,
            expression: expression.to_string(),
        };

        if scheduler.next_firing(Utc::now()).is_none() {
            return Err(ScheduleError::Exhausted(expression.to_string()));
        }

        Ok(scheduler)
    }

    /// Next firing strictly after `after`
    pub fn next_firing(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Run one sweep now
    pub async fn run_sweep(&self) -> SweepReport {
        self.sweep(None).await
    }

    async fn sweep(&self, shutdown: Option<&watch::Receiver<bool>>) -> SweepReport {
        let settings = self.settings.load();
        let mut report = SweepReport::default();

        if !settings.auto_renew {
            report.skipped = settings.domains.len();
            debug!(domain_count = report.skipped, "Auto-renew disabled, skipping sweep");
            return report;
        }

        info!(domain_count = settings.domains.len(), "Checking certificates for renewal");

        for (index, entry) in settings.domains.iter().enumerate() {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                report.skipped = settings.domains.len() - index;
                warn!(remaining = report.skipped, "Shutdown requested, sweep interrupted");
                break;
            }

            let record = self.inspector.inspect(&entry.domain, &settings);
            report.checked += 1;

            if !record.needs_renewal {
                debug!(
                    domain = %entry.domain,
                    exists = record.exists,
                    days_until_expiry = ?record.days_until_expiry,
                    "Certificate does not need renewal"
                );
                continue;
            }

            info!(
                domain = %entry.domain,
                days_until_expiry = ?record.days_until_expiry,
                "Certificate needs renewal"
            );

            match self.orchestrator.renew(&entry.domain).await {
                Ok(()) => report.renewed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        domain = %entry.domain,
                        error = %e,
                        "Certificate renewal failed"
                    );
                }
            }
        }

        info!(
            checked = report.checked,
            renewed = report.renewed,
            failed = report.failed,
            skipped = report.skipped,
            "Renewal sweep completed"
        );

        report
    }

    /// Spawn the scheduler loop
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(schedule = %self.expression, "Starting certificate renewal scheduler");

        loop {
            let now = Utc::now();
            let Some(next) = self.next_firing(now) else {
                warn!(schedule = %self.expression, "Renewal schedule has no upcoming firings");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next_firing = %next, "Next renewal sweep scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }

            self.sweep(Some(&shutdown)).await;

            if *shutdown.borrow() {
                break;
            }
        }

        info!("Certificate renewal scheduler stopped");
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("schedule", &self.expression)
            .field("settings", &self.settings.path())
            .finish()
    }
}

/// Handle to a running [`RenewalScheduler`]
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop firing and wait up to `grace` for an in-flight sweep.
    ///
    /// Returns `false` if the sweep had to be abandoned.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Renewal scheduler task failed");
                true
            }
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "Renewal sweep still running, abandoning it");
                self.task.abort();
                false
            }
        }
    }
}
