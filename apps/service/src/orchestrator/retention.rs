//! Automatic retention and cleanup of monitoring data.
//!
//! - Check results: deleted once older than `retention_days`
//! - Alerts: deleted once *resolved* longer than `retention_days` ago;
//!   unresolved alerts are kept regardless of age
//!
//! Cleanup runs periodically as a background task until cancelled.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::{AlertRepository, ResultRepository, Store};

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// How long results and resolved alerts are kept
    pub retention: chrono::Duration,
    /// Time between cleanup runs
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { retention: chrono::Duration::days(30), interval: Duration::from_secs(3600) }
    }
}

/// Rows removed by one cleanup run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub results: u64,
    pub alerts: u64,
}

pub struct RetentionCleanup {
    store: Arc<dyn Store>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(store: Arc<dyn Store>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Delete everything past the retention cutoff
    pub async fn cleanup_expired(&self) -> Result<CleanupReport> {
        let cutoff = Utc::now() - self.policy.retention;
        debug!(retention_days = self.policy.retention.num_days(), %cutoff, "starting retention cleanup");

        let results = self.store.delete_old_results(cutoff).await?;
        let alerts = self.store.delete_old_alerts(cutoff).await?;

        info!(results, alerts, "retention cleanup completed");
        Ok(CleanupReport { results, alerts })
    }

    /// Spawn the periodic cleanup loop. The first run happens one full
    /// interval after start.
    pub fn start_periodic_cleanup(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.policy.interval;
            let mut interval = tokio::time::interval_at(start, self.policy.interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.cleanup_expired().await {
                            warn!(error = %e, "periodic retention cleanup failed");
                        }
                    }
                }
            }
            debug!("retention cleanup stopped");
        })
    }
}
