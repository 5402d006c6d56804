//! Sliding-window rate limiting with ban escalation.
//!
//! Windows are kept per caller and per caller+domain pair in `DashMap`s, so
//! every mutation of one key happens under that key's shard lock. `admit`
//! only reads; `record_success` and `record_failure` are the only mutators.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

use crate::abuse::ledger::AbuseLedger;
use crate::types::config::RateLimitConfig;

/// Failure reasons containing this marker count as legality violations.
pub const BLACKLIST_MARKER: &str = "blacklist";

/// Escalation state of a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanState {
    #[default]
    Clean,
    Suspicious,
    Banned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanRecord {
    pub state: BanState,
    pub reason: String,
    pub since: DateTime<Utc>,
}

/// Which limit denied an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Banned,
    CallerLimit,
    DomainLimit,
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admission {
    pub allowed: bool,
    pub reason: String,
    pub denial: Option<DenialKind>,
    pub reset_time: Option<DateTime<Utc>>,
}

impl Admission {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "ok".to_string(),
            denial: None,
            reset_time: None,
        }
    }

    fn deny(denial: DenialKind, reason: impl Into<String>, reset_time: Option<DateTime<Utc>>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            denial: Some(denial),
            reset_time,
        }
    }
}

#[derive(Debug, Default)]
struct CallerWindows {
    requests: VecDeque<DateTime<Utc>>,
    failures: VecDeque<DateTime<Utc>>,
    violations: VecDeque<DateTime<Utc>>,
}

impl CallerWindows {
    fn prune(&mut self, boundary: DateTime<Utc>) -> usize {
        prune_window(&mut self.requests, boundary)
            + prune_window(&mut self.failures, boundary)
            + prune_window(&mut self.violations, boundary)
    }

    fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.failures.is_empty() && self.violations.is_empty()
    }
}

/// What a compaction pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionReport {
    pub pruned_entries: usize,
    pub evicted_keys: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
    pub tracked_callers: usize,
    pub tracked_domain_keys: usize,
    pub banned_callers: usize,
    pub suspicious_callers: usize,
}

/// Per-caller and per-domain sliding-window limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    callers: DashMap<String, CallerWindows>,
    domains: DashMap<String, VecDeque<DateTime<Utc>>>,
    bans: DashMap<String, BanRecord>,
    ledger: Arc<AbuseLedger>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, ledger: Arc<AbuseLedger>) -> Self {
        Self {
            config,
            callers: DashMap::new(),
            domains: DashMap::new(),
            bans: DashMap::new(),
            ledger,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Current escalation state of a caller.
    pub fn ban_state(&self, caller: &str) -> BanState {
        self.bans
            .get(caller)
            .map(|record| record.state)
            .unwrap_or_default()
    }

    pub fn ban_record(&self, caller: &str) -> Option<BanRecord> {
        self.bans.get(caller).map(|record| record.clone())
    }

    pub fn is_banned(&self, caller: &str) -> bool {
        self.ban_state(caller) == BanState::Banned
    }

    /// Check whether a request may proceed. Never mutates state.
    pub fn admit(&self, caller: &str, domain: &str) -> Admission {
        self.admit_at(caller, domain, Utc::now())
    }

    pub fn admit_at(&self, caller: &str, domain: &str, now: DateTime<Utc>) -> Admission {
        if let Some(record) = self.bans.get(caller) {
            if record.state == BanState::Banned {
                return Admission::deny(DenialKind::Banned, format!("banned: {}", record.reason), None);
            }
        }

        let window = self.config.window();
        let boundary = now - window;

        if let Some(windows) = self.callers.get(caller) {
            let (count, oldest) = window_count(&windows.requests, boundary);
            if count >= self.config.max_requests_per_caller {
                return Admission::deny(
                    DenialKind::CallerLimit,
                    format!(
                        "rate limit exceeded: {count} requests in the last {}s (max {})",
                        self.config.window_secs, self.config.max_requests_per_caller
                    ),
                    oldest.map(|t| t + window),
                );
            }
        }

        if let Some(timestamps) = self.domains.get(&domain_key(caller, domain)) {
            let (count, oldest) = window_count(&timestamps, boundary);
            if count >= self.config.max_requests_per_domain {
                return Admission::deny(
                    DenialKind::DomainLimit,
                    format!(
                        "rate limit exceeded for {domain}: {count} requests in the last {}s (max {})",
                        self.config.window_secs, self.config.max_requests_per_domain
                    ),
                    oldest.map(|t| t + window),
                );
            }
        }

        Admission::allow()
    }

    /// Count a completed request against the caller and domain windows.
    pub fn record_success(&self, caller: &str, domain: &str) {
        self.record_success_at(caller, domain, Utc::now());
    }

    pub fn record_success_at(&self, caller: &str, domain: &str, now: DateTime<Utc>) {
        self.count_request_at(caller, Some(domain), now);
    }

    /// Count a request refused for bad input or missing credit.
    ///
    /// It occupies the caller's window like any other request but is not a
    /// failure, so it never escalates the ban state.
    pub fn record_denied(&self, caller: &str, domain: Option<&str>) {
        self.count_request_at(caller, domain, Utc::now());
    }

    pub fn record_denied_at(&self, caller: &str, domain: Option<&str>, now: DateTime<Utc>) {
        self.count_request_at(caller, domain, now);
    }

    fn count_request_at(&self, caller: &str, domain: Option<&str>, now: DateTime<Utc>) {
        let boundary = now - self.config.window();

        {
            let mut windows = self.callers.entry(caller.to_string()).or_default();
            windows.prune(boundary);
            windows.requests.push_back(now);
        }

        if let Some(domain) = domain {
            let mut timestamps = self.domains.entry(domain_key(caller, domain)).or_default();
            prune_window(&mut timestamps, boundary);
            timestamps.push_back(now);
        }
    }

    /// Record a failed or denied request and escalate if thresholds are hit.
    ///
    /// Returns the caller's state after escalation.
    pub async fn record_failure(&self, caller: &str, reason: &str) -> BanState {
        self.record_failure_at(caller, reason, Utc::now()).await
    }

    pub async fn record_failure_at(&self, caller: &str, reason: &str, now: DateTime<Utc>) -> BanState {
        let boundary = now - self.config.window();
        let is_violation = reason.to_lowercase().contains(BLACKLIST_MARKER);

        let (failures, violations) = {
            let mut windows = self.callers.entry(caller.to_string()).or_default();
            windows.prune(boundary);
            windows.failures.push_back(now);
            if is_violation {
                windows.violations.push_back(now);
            }
            (windows.failures.len(), windows.violations.len())
        };

        debug!(caller, failures, violations, reason, "Recorded failure");

        let current = self.ban_state(caller);
        if current == BanState::Banned {
            return current;
        }

        let escalation = if violations >= self.config.max_blacklist_violations {
            Some((
                BanState::Banned,
                format!("banned after {violations} blacklist violations within the window"),
            ))
        } else if failures >= self.config.max_failures {
            Some((
                BanState::Banned,
                format!("banned after {failures} failures within the window (flood)"),
            ))
        } else if current == BanState::Clean
            && (violations > 0 || failures >= self.config.suspicious_failures)
        {
            Some((
                BanState::Suspicious,
                format!("suspicious activity: {failures} failures, {violations} legality violations"),
            ))
        } else {
            None
        };

        let Some((state, incident_reason)) = escalation else {
            return current;
        };

        if !self.escalate(caller, state, &incident_reason, now) {
            return self.ban_state(caller);
        }

        self.ledger
            .report(
                caller,
                incident_reason,
                json!({
                    "failures": failures,
                    "violations": violations,
                    "lastReason": reason,
                }),
            )
            .await;

        state
    }

    /// Raise a caller to `state` unless already at or above it.
    ///
    /// Returns true when the state changed.
    fn escalate(&self, caller: &str, state: BanState, reason: &str, now: DateTime<Utc>) -> bool {
        let mut record = self.bans.entry(caller.to_string()).or_insert_with(|| BanRecord {
            state: BanState::Clean,
            reason: String::new(),
            since: now,
        });

        if record.state >= state {
            return false;
        }

        info!(caller, from = ?record.state, to = ?state, reason, "Caller escalated");
        record.state = state;
        record.reason = reason.to_string();
        record.since = now;
        true
    }

    /// Ban a caller administratively.
    pub async fn ban(&self, caller: &str, reason: &str) {
        let now = Utc::now();
        self.bans.insert(
            caller.to_string(),
            BanRecord {
                state: BanState::Banned,
                reason: reason.to_string(),
                since: now,
            },
        );
        info!(caller, reason, "Caller banned by administrator");
        self.ledger
            .report(caller, format!("manual ban: {reason}"), json!({ "manual": true }))
            .await;
    }

    /// Reset a caller to clean and clear its failure history.
    ///
    /// Returns false when the caller had no escalation on record.
    pub async fn unban(&self, caller: &str) -> bool {
        let removed = self.bans.remove(caller).is_some();
        if let Some(mut windows) = self.callers.get_mut(caller) {
            windows.failures.clear();
            windows.violations.clear();
        }

        if removed {
            info!(caller, "Caller reinstated by administrator");
            self.ledger
                .report(caller, "caller reinstated by administrator", json!({ "manual": true }))
                .await;
        }
        removed
    }

    /// Drop timestamps outside the window and evict empty keys.
    pub fn compact(&self) -> CompactionReport {
        self.compact_at(Utc::now())
    }

    pub fn compact_at(&self, now: DateTime<Utc>) -> CompactionReport {
        let boundary = now - self.config.window();
        let mut report = CompactionReport::default();

        self.callers.retain(|_, windows| {
            report.pruned_entries += windows.prune(boundary);
            let keep = !windows.is_empty();
            if !keep {
                report.evicted_keys += 1;
            }
            keep
        });

        self.domains.retain(|_, timestamps| {
            report.pruned_entries += prune_window(timestamps, boundary);
            let keep = !timestamps.is_empty();
            if !keep {
                report.evicted_keys += 1;
            }
            keep
        });

        debug!(
            pruned = report.pruned_entries,
            evicted = report.evicted_keys,
            "Rate windows compacted"
        );
        report
    }

    pub fn stats(&self) -> RateLimiterStats {
        let mut stats = RateLimiterStats {
            tracked_callers: self.callers.len(),
            tracked_domain_keys: self.domains.len(),
            ..Default::default()
        };
        for record in self.bans.iter() {
            match record.state {
                BanState::Banned => stats.banned_callers += 1,
                BanState::Suspicious => stats.suspicious_callers += 1,
                BanState::Clean => {}
            }
        }
        stats
    }
}

fn domain_key(caller: &str, domain: &str) -> String {
    format!("{caller}|{domain}")
}

/// Entries strictly after `boundary`, and the oldest of them.
fn window_count(
    timestamps: &VecDeque<DateTime<Utc>>,
    boundary: DateTime<Utc>,
) -> (usize, Option<DateTime<Utc>>) {
    let mut in_window = timestamps.iter().filter(|t| **t > boundary);
    let oldest = in_window.next().copied();
    let count = oldest.map(|_| 1 + in_window.count()).unwrap_or(0);
    (count, oldest)
}

fn prune_window(timestamps: &mut VecDeque<DateTime<Utc>>, boundary: DateTime<Utc>) -> usize {
    let mut pruned = 0;
    while timestamps.front().is_some_and(|t| *t <= boundary) {
        timestamps.pop_front();
        pruned += 1;
    }
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abuse::severity::Severity;
    use chrono::Duration;

    fn limiter() -> (RateLimiter, Arc<AbuseLedger>) {
        let ledger = Arc::new(AbuseLedger::default());
        (
            RateLimiter::new(RateLimitConfig::default(), ledger.clone()),
            ledger,
        )
    }

    #[test]
    fn test_caller_cap_and_window_slide() {
        let (limiter, _) = limiter();
        let start = Utc::now();

        for i in 0..100 {
            let domain = format!("site{}.com", i % 5);
            let now = start + Duration::seconds(i);
            assert!(limiter.admit_at("1.2.3.4", &domain, now).allowed);
            limiter.record_success_at("1.2.3.4", &domain, now);
        }

        let denied = limiter.admit_at("1.2.3.4", "other.com", start + Duration::seconds(100));
        assert!(!denied.allowed);
        assert_eq!(denied.denial, Some(DenialKind::CallerLimit));
        assert_eq!(denied.reset_time, Some(start + Duration::hours(1)));

        // Earliest timestamp slides out of the window
        let later = start + Duration::hours(1) + Duration::milliseconds(1);
        assert!(limiter.admit_at("1.2.3.4", "other.com", later).allowed);
    }

    #[test]
    fn test_domain_cap_is_independent() {
        let (limiter, _) = limiter();
        let now = Utc::now();

        for _ in 0..60 {
            limiter.record_success_at("1.2.3.4", "example.com", now);
        }

        let denied = limiter.admit_at("1.2.3.4", "example.com", now);
        assert_eq!(denied.denial, Some(DenialKind::DomainLimit));

        assert!(limiter.admit_at("1.2.3.4", "other.com", now).allowed);
        assert!(limiter.admit_at("5.6.7.8", "example.com", now).allowed);
    }

    #[test]
    fn test_denied_requests_fill_caller_window_without_escalating() {
        let (limiter, _) = limiter();
        let now = Utc::now();

        for i in 0..100 {
            let domain = format!("site{i}.example");
            assert!(limiter.admit_at("1.2.3.4", &domain, now).allowed);
            let domain = if i % 2 == 0 { Some(domain.as_str()) } else { None };
            limiter.record_denied_at("1.2.3.4", domain, now);
        }

        let denied = limiter.admit_at("1.2.3.4", "fresh.example", now);
        assert_eq!(denied.denial, Some(DenialKind::CallerLimit));
        assert_eq!(limiter.ban_state("1.2.3.4"), BanState::Clean);
    }

    #[test]
    fn test_admit_does_not_mutate() {
        let (limiter, _) = limiter();
        for _ in 0..500 {
            limiter.admit("1.2.3.4", "example.com");
        }
        assert_eq!(limiter.stats().tracked_callers, 0);
    }

    #[tokio::test]
    async fn test_blacklist_violations_ban_fast() {
        let (limiter, ledger) = limiter();
        let now = Utc::now();

        let first = limiter
            .record_failure_at("6.6.6.6", "blacklisted domain: amazon.com", now)
            .await;
        assert_eq!(first, BanState::Suspicious);

        limiter
            .record_failure_at("6.6.6.6", "blacklisted domain: amazon.com", now)
            .await;
        let third = limiter
            .record_failure_at("6.6.6.6", "blacklisted domain: amazon.com", now)
            .await;
        assert_eq!(third, BanState::Banned);

        let admission = limiter.admit_at("6.6.6.6", "example.com", now + Duration::days(2));
        assert_eq!(admission.denial, Some(DenialKind::Banned));

        let incidents = ledger.incidents_for("6.6.6.6").await;
        assert_eq!(incidents[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_violations_outside_window_do_not_ban() {
        let (limiter, _) = limiter();
        let start = Utc::now();

        limiter
            .record_failure_at("6.6.6.6", "blacklisted", start)
            .await;
        limiter
            .record_failure_at("6.6.6.6", "blacklisted", start + Duration::minutes(1))
            .await;
        let state = limiter
            .record_failure_at("6.6.6.6", "blacklisted", start + Duration::hours(2))
            .await;

        assert_eq!(state, BanState::Suspicious);
    }

    #[tokio::test]
    async fn test_failure_cap_bans() {
        let (limiter, _) = limiter();
        let now = Utc::now();

        let mut state = BanState::Clean;
        for i in 0..10 {
            state = limiter
                .record_failure_at("7.7.7.7", "extraction failed: timeout", now)
                .await;
            if i < 4 {
                assert_eq!(state, BanState::Clean);
            }
        }
        assert_eq!(state, BanState::Banned);
    }

    #[tokio::test]
    async fn test_unban_resets_to_clean() {
        let (limiter, _) = limiter();
        limiter.ban("8.8.8.8", "manual review").await;
        assert!(limiter.is_banned("8.8.8.8"));

        assert!(limiter.unban("8.8.8.8").await);
        assert_eq!(limiter.ban_state("8.8.8.8"), BanState::Clean);
        assert!(limiter.admit("8.8.8.8", "example.com").allowed);
        assert!(!limiter.unban("8.8.8.8").await);
    }

    #[tokio::test]
    async fn test_compaction_evicts_empty_keys() {
        let (limiter, _) = limiter();
        let start = Utc::now();

        limiter.record_success_at("1.1.1.1", "a.com", start);
        limiter.record_success_at("2.2.2.2", "b.com", start + Duration::minutes(50));

        let report = limiter.compact_at(start + Duration::minutes(70));
        assert_eq!(report.pruned_entries, 2);
        assert_eq!(report.evicted_keys, 2);

        let stats = limiter.stats();
        assert_eq!(stats.tracked_callers, 1);
        assert_eq!(stats.tracked_domain_keys, 1);
    }
}
