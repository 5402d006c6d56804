//! Storage traits for the durable parts of the ledgers.
//!
//! The storage layer is split into focused traits for flexibility:
//! - `BlacklistStore`: Dynamic blacklist entries (overwrite document)
//! - `IncidentStore`: Abuse incidents (append log)
//! - `AuditStore`: Per-request audit entries (append log)
//! - `LedgerStore`: Composite trait combining all three
//!
//! Credit accounts and rate windows are in-memory only.

use async_trait::async_trait;

use crate::abuse::ledger::{AbuseIncident, AuditEntry};
use crate::error::StoreResult;

/// Store for administratively added blacklist domains.
#[async_trait]
pub trait BlacklistStore: Send + Sync {
    /// Load all dynamic entries.
    async fn load_blacklist(&self) -> StoreResult<Vec<String>>;

    /// Replace the stored entries.
    async fn save_blacklist(&self, domains: &[String]) -> StoreResult<()>;
}

/// Append log for abuse incidents.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn append_incident(&self, incident: &AbuseIncident) -> StoreResult<()>;

    /// Load the most recent `limit` incidents, oldest first.
    async fn load_incidents(&self, limit: usize) -> StoreResult<Vec<AbuseIncident>>;
}

/// Append log for request audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;
}

/// Composite trait for all durable gateway state.
pub trait LedgerStore: BlacklistStore + IncidentStore + AuditStore {}

impl<T: BlacklistStore + IncidentStore + AuditStore> LedgerStore for T {}
