//! Abuse incident ledger and request audit log.
//!
//! Both are bounded rings held in memory; when a store is attached every
//! entry is also appended to it. Store failures are logged and never
//! propagate to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::abuse::severity::{classify_severity, Severity};
use crate::traits::store::LedgerStore;
use crate::types::config::AbuseConfig;
use crate::types::record::ScrapeOutcome;
use crate::types::request::CreditStatus;
use crate::types::tier::Tier;

/// A recorded abuse incident. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbuseIncident {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub caller: String,
    pub reason: String,
    pub severity: Severity,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Request facts known to the gateway when it settles.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub caller: String,
    pub url: String,
    pub domain: String,
    pub tier: Tier,
    pub duration_ms: u64,
    pub bytes: usize,
    pub credit_status: CreditStatus,
}

/// One audit record per settled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub caller: String,
    pub url: String,
    pub domain: String,
    pub tier: Tier,
    pub success: bool,
    pub record_count: usize,
    pub error_kind: Option<String>,
    pub duration_ms: u64,
    pub bytes: usize,
    pub credit_status: CreditStatus,
}

/// Aggregate view of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbuseStats {
    /// Incidents recorded since start (including evicted ones)
    pub total_incidents: u64,

    /// Incidents currently retained, per severity
    pub retained_by_severity: BTreeMap<Severity, usize>,

    pub total_requests_logged: u64,
    pub failed_requests_logged: u64,
}

/// Append-only incident ledger with bounded retention.
pub struct AbuseLedger {
    incidents: Mutex<VecDeque<AbuseIncident>>,
    audit: Mutex<VecDeque<AuditEntry>>,
    config: AbuseConfig,
    store: Option<Arc<dyn LedgerStore>>,
    total_incidents: AtomicU64,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
}

impl Default for AbuseLedger {
    fn default() -> Self {
        Self::new(AbuseConfig::default())
    }
}

impl AbuseLedger {
    pub fn new(config: AbuseConfig) -> Self {
        Self {
            incidents: Mutex::new(VecDeque::with_capacity(config.incident_capacity.min(1024))),
            audit: Mutex::new(VecDeque::new()),
            config,
            store: None,
            total_incidents: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
        }
    }

    /// Attach a durable store.
    pub fn with_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reload retained incidents from the attached store.
    pub async fn restore(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        match store.load_incidents(self.config.incident_capacity).await {
            Ok(loaded) => {
                let count = loaded.len();
                let mut incidents = self.incidents.lock().await;
                for incident in loaded {
                    push_bounded(&mut incidents, incident, self.config.incident_capacity);
                }
                info!(count, "Restored abuse incidents");
                count
            }
            Err(e) => {
                error!(error = %e, "Failed to load abuse incidents");
                0
            }
        }
    }

    /// Record an incident, classifying its severity from `reason`.
    pub async fn report(
        &self,
        caller: &str,
        reason: impl Into<String>,
        metadata: serde_json::Value,
    ) -> AbuseIncident {
        let reason = reason.into();
        let incident = AbuseIncident {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            caller: caller.to_string(),
            severity: classify_severity(&reason),
            reason,
            metadata,
        };

        warn!(
            caller = %incident.caller,
            severity = %incident.severity,
            reason = %incident.reason,
            "Abuse incident recorded"
        );

        {
            let mut incidents = self.incidents.lock().await;
            push_bounded(&mut incidents, incident.clone(), self.config.incident_capacity);
        }
        self.total_incidents.fetch_add(1, Ordering::Relaxed);

        if let Some(store) = &self.store {
            if let Err(e) = store.append_incident(&incident).await {
                error!(error = %e, incident = %incident.id, "Failed to persist incident");
            }
        }

        incident
    }

    /// Most recent incidents first.
    pub async fn recent(&self, limit: usize) -> Vec<AbuseIncident> {
        self.incidents
            .lock()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Incidents filed against one caller, most recent first.
    pub async fn incidents_for(&self, caller: &str) -> Vec<AbuseIncident> {
        self.incidents
            .lock()
            .await
            .iter()
            .rev()
            .filter(|i| i.caller == caller)
            .cloned()
            .collect()
    }

    /// Append an audit record for a settled request.
    pub async fn log_request(&self, meta: RequestMeta, outcome: &ScrapeOutcome) -> AuditEntry {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            caller: meta.caller,
            url: meta.url,
            domain: meta.domain,
            tier: meta.tier,
            success: outcome.success,
            record_count: outcome.record_count,
            error_kind: outcome.error_kind.clone(),
            duration_ms: meta.duration_ms,
            bytes: meta.bytes,
            credit_status: meta.credit_status,
        };

        {
            let mut audit = self.audit.lock().await;
            push_bounded(&mut audit, entry.clone(), self.config.audit_capacity);
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !outcome.success {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.append_audit(&entry).await {
                error!(error = %e, "Failed to persist audit entry");
            }
        }

        entry
    }

    /// Most recent audit entries first.
    pub async fn recent_requests(&self, limit: usize) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> AbuseStats {
        let mut retained_by_severity = BTreeMap::new();
        for incident in self.incidents.lock().await.iter() {
            *retained_by_severity.entry(incident.severity).or_insert(0) += 1;
        }

        AbuseStats {
            total_incidents: self.total_incidents.load(Ordering::Relaxed),
            retained_by_severity,
            total_requests_logged: self.total_requests.load(Ordering::Relaxed),
            failed_requests_logged: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(item);
}
