//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (every 5 minutes)
//!     │
//!     └─► gateway.compact()
//!             ├─► prune expired rate windows
//!             ├─► evict stale robots.txt rules
//!             └─► evict expired credit accounts
//! ```

use anyhow::Result;
use scrapegate::AdmissionGateway;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Every five minutes, on the minute.
pub const COMPACTION_SCHEDULE: &str = "0 */5 * * * *";

/// Start all scheduled tasks
pub async fn start_scheduler(gateway: AdmissionGateway) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let compaction_job = Job::new_async(COMPACTION_SCHEDULE, move |_uuid, _lock| {
        let gateway = gateway.clone();
        Box::pin(async move {
            run_compaction(&gateway);
        })
    })?;

    scheduler.add(compaction_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (ledger compaction every 5 minutes)");
    Ok(scheduler)
}

fn run_compaction(gateway: &AdmissionGateway) {
    let report = gateway.compact();
    tracing::debug!(
        pruned_entries = report.rate_windows.pruned_entries,
        evicted_keys = report.rate_windows.evicted_keys,
        robots_evicted = report.robots_evicted,
        accounts_evicted = report.accounts_evicted,
        "Scheduled compaction finished"
    );
}
