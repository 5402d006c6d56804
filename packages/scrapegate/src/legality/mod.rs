//! Legality gate: decides whether a target URL may be fetched at all.
//!
//! Checks run in order and stop at the first denial:
//! 1. URL parsing and SSRF guard
//! 2. Blacklist (exact domain, then parent suffixes)
//! 3. robots.txt (cached per domain, fail-open)

pub mod blacklist;
pub mod robots;
pub mod robots_cache;
pub mod url_guard;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub use blacklist::{Blacklist, BlacklistMatch, BlacklistSource};
pub use robots::RobotsTxt;
pub use robots_cache::{HttpRobotsFetcher, RobotsCache, RobotsDecision};
pub use url_guard::{normalize_domain, TargetUrl, UrlGuard, UrlRejection};

use crate::traits::robots::RobotsFetcher;
use crate::traits::store::LedgerStore;
use crate::types::config::LegalityConfig;

pub const REASON_INVALID_URL: &str = "invalid URL";
pub const REASON_BLACKLISTED: &str = "blacklisted";

/// Outcome of a legality check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalityDecision {
    pub allowed: bool,
    pub reason: String,

    /// True only when robots.txt was consulted and allows the path
    /// (a missing or unreachable robots.txt counts as allowing).
    pub robots_compliant: bool,

    /// Normalized domain, when the URL parsed
    pub domain: Option<String>,

    /// Blacklist entry that matched, if any
    pub blacklist_entry: Option<String>,
}

impl LegalityDecision {
    fn rejected(reason: impl Into<String>, domain: Option<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            robots_compliant: false,
            domain,
            blacklist_entry: None,
        }
    }
}

/// Combined blacklist and robots.txt compliance check.
pub struct LegalityGate {
    guard: UrlGuard,
    blacklist: Blacklist,
    robots: RobotsCache,
    store: Option<Arc<dyn LedgerStore>>,

    /// Serializes blacklist mutation with its snapshot and save.
    persist_lock: Mutex<()>,
}

impl LegalityGate {
    pub fn new(config: &LegalityConfig, fetcher: Arc<dyn RobotsFetcher>) -> Self {
        let guard = if config.block_private_hosts {
            UrlGuard::new()
        } else {
            UrlGuard::new().allow_private()
        };

        Self {
            guard,
            blacklist: Blacklist::new(&config.static_blacklist),
            robots: RobotsCache::new(fetcher, config),
            store: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Attach a store for dynamic blacklist persistence.
    pub fn with_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reload dynamic blacklist entries from the attached store.
    pub async fn restore(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        match store.load_blacklist().await {
            Ok(domains) => {
                self.blacklist.restore(domains).await;
                let count = self.blacklist.dynamic_count().await;
                info!(count, "Restored dynamic blacklist");
                count
            }
            Err(e) => {
                error!(error = %e, "Failed to load dynamic blacklist");
                0
            }
        }
    }

    pub async fn check_legality(&self, url: &str) -> LegalityDecision {
        let target = match self.guard.parse(url) {
            Ok(target) => target,
            Err(UrlRejection::Invalid) => {
                return LegalityDecision::rejected(REASON_INVALID_URL, None);
            }
            Err(rejection) => {
                debug!(url, reason = %rejection, "URL rejected");
                return LegalityDecision::rejected(rejection.to_string(), None);
            }
        };

        if let Some(hit) = self.blacklist.lookup(&target.domain).await {
            debug!(domain = %target.domain, entry = %hit.entry, "Blacklisted domain");
            return LegalityDecision {
                blacklist_entry: Some(hit.entry),
                ..LegalityDecision::rejected(REASON_BLACKLISTED, Some(target.domain))
            };
        }

        let robots = self.robots.check(&target).await;
        LegalityDecision {
            allowed: robots.allowed,
            reason: robots.reason,
            robots_compliant: robots.allowed,
            domain: Some(target.domain),
            blacklist_entry: None,
        }
    }

    /// Add a domain to the dynamic blacklist and persist the list.
    ///
    /// Returns false if the domain was already blacklisted.
    pub async fn add_to_blacklist(&self, domain: &str) -> bool {
        // Held until the save lands so an older snapshot never overwrites a newer one.
        let _persist = self.persist_lock.lock().await;

        let added = self.blacklist.add(domain).await;
        if !added {
            return false;
        }

        info!(domain = %normalize_domain(domain), "Domain added to dynamic blacklist");

        if let Some(store) = &self.store {
            let entries = self.blacklist.dynamic_entries().await;
            if let Err(e) = store.save_blacklist(&entries).await {
                error!(error = %e, "Failed to persist dynamic blacklist");
            }
        }
        true
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn robots(&self) -> &RobotsCache {
        &self.robots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abuse::ledger::{AbuseIncident, AuditEntry};
    use crate::error::StoreResult;
    use crate::stores::MemoryStore;
    use crate::testing::StaticRobotsFetcher;
    use crate::traits::store::{AuditStore, BlacklistStore, IncidentStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Store whose first blacklist save stalls, so a later save can finish first.
    struct StallingStore {
        inner: MemoryStore,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl BlacklistStore for StallingStore {
        async fn load_blacklist(&self) -> StoreResult<Vec<String>> {
            self.inner.load_blacklist().await
        }

        async fn save_blacklist(&self, domains: &[String]) -> StoreResult<()> {
            if self.saves.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.save_blacklist(domains).await
        }
    }

    #[async_trait]
    impl IncidentStore for StallingStore {
        async fn append_incident(&self, incident: &AbuseIncident) -> StoreResult<()> {
            self.inner.append_incident(incident).await
        }

        async fn load_incidents(&self, limit: usize) -> StoreResult<Vec<AbuseIncident>> {
            self.inner.load_incidents(limit).await
        }
    }

    #[async_trait]
    impl AuditStore for StallingStore {
        async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
            self.inner.append_audit(entry).await
        }
    }

    fn gate(fetcher: StaticRobotsFetcher) -> LegalityGate {
        LegalityGate::new(&LegalityConfig::default(), Arc::new(fetcher))
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let decision = gate(StaticRobotsFetcher::new()).check_legality("::not-a-url").await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, REASON_INVALID_URL);
    }

    #[tokio::test]
    async fn test_subdomain_of_blacklisted_parent() {
        let decision = gate(StaticRobotsFetcher::new())
            .check_legality("https://shop.amazon.com/deals")
            .await;

        assert!(!decision.allowed);
        assert_eq!(decision.reason, REASON_BLACKLISTED);
        assert_eq!(decision.blacklist_entry.as_deref(), Some("amazon.com"));
        assert!(!decision.robots_compliant);
    }

    #[tokio::test]
    async fn test_blacklist_skips_robots_fetch() {
        let fetcher = Arc::new(StaticRobotsFetcher::new());
        let gate = LegalityGate::new(&LegalityConfig::default(), fetcher.clone());

        gate.check_legality("https://www.facebook.com/").await;
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_robots_denial() {
        let gate = gate(StaticRobotsFetcher::new().with_robots("example.com", "User-agent: *\nDisallow: /\n"));

        let decision = gate.check_legality("https://example.com/anything").await;
        assert!(!decision.allowed);
        assert!(decision.reason.contains("robots.txt"));
        assert!(!decision.robots_compliant);
    }

    #[tokio::test]
    async fn test_allowed() {
        let decision = gate(StaticRobotsFetcher::new())
            .check_legality("https://example.com/page")
            .await;

        assert!(decision.allowed);
        assert!(decision.robots_compliant);
        assert_eq!(decision.domain.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_dynamic_blacklist_add() {
        let gate = gate(StaticRobotsFetcher::new());

        assert!(gate.add_to_blacklist("scraped-too-much.org").await);
        assert!(!gate.add_to_blacklist("scraped-too-much.org").await);

        let decision = gate.check_legality("https://api.scraped-too-much.org/").await;
        assert_eq!(decision.reason, REASON_BLACKLISTED);
    }

    #[tokio::test]
    async fn test_private_host_rejected() {
        let decision = gate(StaticRobotsFetcher::new())
            .check_legality("http://192.168.1.10/admin")
            .await;
        assert!(!decision.allowed);
        assert!(decision.reason.starts_with("blocked host"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_adds_all_persist() {
        let store = Arc::new(StallingStore {
            inner: MemoryStore::new(),
            saves: AtomicUsize::new(0),
        });
        let gate = Arc::new(gate(StaticRobotsFetcher::new()).with_store(store.clone()));

        let first = tokio::spawn({
            let gate = gate.clone();
            async move { gate.add_to_blacklist("first-target.org").await }
        });
        tokio::task::yield_now().await;
        let second = tokio::spawn({
            let gate = gate.clone();
            async move { gate.add_to_blacklist("second-target.org").await }
        });

        assert!(first.await.unwrap());
        assert!(second.await.unwrap());

        let mut persisted = store.load_blacklist().await.unwrap();
        persisted.sort();
        assert_eq!(persisted, vec!["first-target.org", "second-target.org"]);

        let restored = LegalityGate::new(&LegalityConfig::default(), Arc::new(StaticRobotsFetcher::new()))
            .with_store(store);
        assert_eq!(restored.restore().await, 2);
        let decision = restored.check_legality("https://second-target.org/").await;
        assert_eq!(decision.reason, REASON_BLACKLISTED);
    }
}
