//! Administrative operations and aggregate statistics.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::AdmissionGateway;
use crate::abuse::ledger::{AbuseIncident, AbuseStats, AuditEntry};
use crate::abuse::rate_limiter::{BanState, RateLimiterStats};
use crate::credits::ledger::{CreditAccount, CreditLedgerStats};
use crate::types::tier::Tier;

/// Snapshot of every ledger for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub rate_limiter: RateLimiterStats,
    pub abuse: AbuseStats,
    pub credits: CreditLedgerStats,
    pub static_blacklist: usize,
    pub dynamic_blacklist: usize,
    pub robots_cached: usize,
}

/// What was reloaded from the store on startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub blacklist_entries: usize,
    pub incidents: usize,
}

impl AdmissionGateway {
    /// Reload the dynamic blacklist and recent incidents from the store.
    pub async fn restore(&self) -> RestoreReport {
        let report = RestoreReport {
            blacklist_entries: self.legality().restore().await,
            incidents: self.abuse().restore().await,
        };
        info!(
            blacklist = report.blacklist_entries,
            incidents = report.incidents,
            "Gateway state restored"
        );
        report
    }

    /// Mint credits for a confirmed payment.
    pub fn issue_credits(&self, payment_ref: &str, tier: Tier) -> String {
        self.credits().issue(payment_ref, tier)
    }

    pub fn balance(&self, token: &str) -> Option<CreditAccount> {
        self.credits().balance(token)
    }

    pub async fn ban(&self, caller: &str, reason: &str) {
        self.limiter().ban(caller, reason).await;
    }

    pub async fn unban(&self, caller: &str) -> bool {
        self.limiter().unban(caller).await
    }

    pub fn ban_state(&self, caller: &str) -> BanState {
        self.limiter().ban_state(caller)
    }

    /// Add a domain (and so all its subdomains) to the dynamic blacklist.
    pub async fn add_to_blacklist(&self, domain: &str) -> bool {
        self.legality().add_to_blacklist(domain).await
    }

    pub async fn recent_incidents(&self, limit: usize) -> Vec<AbuseIncident> {
        self.abuse().recent(limit).await
    }

    pub async fn recent_requests(&self, limit: usize) -> Vec<AuditEntry> {
        self.abuse().recent_requests(limit).await
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            rate_limiter: self.limiter().stats(),
            abuse: self.abuse().stats().await,
            credits: self.credits().stats(),
            static_blacklist: self.legality().blacklist().static_count(),
            dynamic_blacklist: self.legality().blacklist().dynamic_count().await,
            robots_cached: self.legality().robots().len(),
        }
    }
}
