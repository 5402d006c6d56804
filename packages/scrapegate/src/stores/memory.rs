//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::abuse::ledger::{AbuseIncident, AuditEntry};
use crate::error::StoreResult;
use crate::traits::store::{AuditStore, BlacklistStore, IncidentStore};

/// In-memory ledger store.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    blacklist: RwLock<Vec<String>>,
    incidents: RwLock<Vec<AbuseIncident>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored incidents.
    pub async fn incident_count(&self) -> usize {
        self.incidents.read().await.len()
    }

    /// Get the number of stored audit entries.
    pub async fn audit_count(&self) -> usize {
        self.audit.read().await.len()
    }

    /// All stored audit entries, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().await.clone()
    }
}

#[async_trait]
impl BlacklistStore for MemoryStore {
    async fn load_blacklist(&self) -> StoreResult<Vec<String>> {
        Ok(self.blacklist.read().await.clone())
    }

    async fn save_blacklist(&self, domains: &[String]) -> StoreResult<()> {
        *self.blacklist.write().await = domains.to_vec();
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn append_incident(&self, incident: &AbuseIncident) -> StoreResult<()> {
        self.incidents.write().await.push(incident.clone());
        Ok(())
    }

    async fn load_incidents(&self, limit: usize) -> StoreResult<Vec<AbuseIncident>> {
        let incidents = self.incidents.read().await;
        let skip = incidents.len().saturating_sub(limit);
        Ok(incidents[skip..].to_vec())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.audit.write().await.push(entry.clone());
        Ok(())
    }
}
