//! Background work tracking.
//!
//! Counts in-flight certificate operations so shutdown can wait for them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

/// Tracks in-flight background operations
#[derive(Debug, Clone, Default)]
pub struct WorkTracker {
    /// Active operations counter
    active: Arc<AtomicUsize>,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an operation as started; it ends when the guard drops
    pub fn begin(&self) -> WorkGuard {
        let count = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(active_operations = count, "Operation started");
        WorkGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Get active operation count
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Wait for active operations to finish
    ///
    /// Returns `true` if all operations finished within `max_wait`,
    /// `false` if the wait timed out with operations still active.
    pub async fn wait_for_drain(&self, max_wait: Duration) -> bool {
        let start = Instant::now();
        let initial_count = self.active_count();

        if initial_count == 0 {
            return true;
        }

        info!(
            active_operations = initial_count,
            max_wait_secs = max_wait.as_secs(),
            "Waiting for background operations"
        );

        let mut last_logged_count = initial_count;

        while self.active_count() > 0 {
            if start.elapsed() > max_wait {
                warn!(
                    remaining_operations = self.active_count(),
                    elapsed_secs = start.elapsed().as_secs(),
                    "Drain timeout reached, operations still active"
                );
                return false;
            }

            let current_count = self.active_count();
            if current_count != last_logged_count {
                debug!(
                    remaining_operations = current_count,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Draining background operations"
                );
                last_logged_count = current_count;
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!(
            elapsed_ms = start.elapsed().as_millis(),
            initial_operations = initial_count,
            "All background operations finished"
        );
        true
    }
}

/// Marks one in-flight operation
#[derive(Debug)]
pub struct WorkGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        let count = self.active.fetch_sub(1, Ordering::Relaxed) - 1;
        trace!(active_operations = count, "Operation finished");
    }
}
