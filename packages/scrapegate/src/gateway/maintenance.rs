//! Periodic compaction of in-memory state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::AdmissionGateway;
use crate::abuse::rate_limiter::CompactionReport;

/// What one maintenance pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub rate_windows: CompactionReport,
    pub robots_evicted: usize,
    pub accounts_evicted: usize,
}

impl AdmissionGateway {
    /// Prune rate windows, stale robots entries and expired accounts.
    pub fn compact(&self) -> MaintenanceReport {
        self.compact_at(Utc::now())
    }

    pub fn compact_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let report = MaintenanceReport {
            rate_windows: self.limiter().compact_at(now),
            robots_evicted: self.legality().robots().compact_at(now),
            accounts_evicted: self.credits().evict_expired_at(now),
        };
        debug!(?report, "Maintenance pass complete");
        report
    }

    /// Run [`compact`](Self::compact) on the configured interval until
    /// `shutdown` is cancelled.
    pub fn spawn_maintenance(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let gateway = self.clone();
        let period = self.config().rate_limit.compaction_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;

            info!(period_secs = period.as_secs(), "Maintenance loop started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        gateway.compact();
                    }
                    _ = shutdown.cancelled() => {
                        info!("Maintenance loop stopped");
                        break;
                    }
                }
            }
        })
    }
}
