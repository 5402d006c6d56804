//! Configuration types for the gateway and its ledgers.

use serde::{Deserialize, Serialize};

/// Domains whose terms of service forbid automated extraction.
pub const DEFAULT_STATIC_BLACKLIST: &[&str] = &[
    "amazon.com",
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "netflix.com",
];

/// Top-level configuration for the admission gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub legality: LegalityConfig,

    #[serde(default)]
    pub credits: CreditConfig,

    #[serde(default)]
    pub abuse: AbuseConfig,
}

impl GatewayConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_legality(mut self, legality: LegalityConfig) -> Self {
        self.legality = legality;
        self
    }

    pub fn with_credits(mut self, credits: CreditConfig) -> Self {
        self.credits = credits;
        self
    }

    pub fn with_abuse(mut self, abuse: AbuseConfig) -> Self {
        self.abuse = abuse;
        self
    }
}

/// Sliding-window limits and ban escalation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Trailing window length in seconds. Default: 3600.
    pub window_secs: i64,

    /// Requests per caller per window. Default: 100.
    pub max_requests_per_caller: usize,

    /// Requests per caller+domain pair per window. Default: 60.
    pub max_requests_per_domain: usize,

    /// Failures per caller per window before a ban. Default: 10.
    pub max_failures: usize,

    /// Blacklist-violation failures per caller per window before an
    /// immediate ban. Default: 3.
    pub max_blacklist_violations: usize,

    /// Failures per window that mark a caller suspicious. Default: 5.
    pub suspicious_failures: usize,

    /// Background compaction interval in seconds. Default: 300.
    pub compaction_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            max_requests_per_caller: 100,
            max_requests_per_domain: 60,
            max_failures: 10,
            max_blacklist_violations: 3,
            suspicious_failures: 5,
            compaction_interval_secs: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs)
    }

    pub fn compaction_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.compaction_interval_secs)
    }
}

/// Blacklist and robots.txt settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalityConfig {
    /// Immutable blacklist entries.
    pub static_blacklist: Vec<String>,

    /// How long a fetched robots.txt stays valid, in seconds. Default: 24h.
    pub robots_ttl_secs: i64,

    /// Outbound robots.txt fetch timeout in seconds. Default: 10.
    pub robots_timeout_secs: u64,

    /// Outbound robots.txt fetches per second across all domains. Default: 5.
    pub robots_fetches_per_second: u32,

    /// User agent sent with robots.txt fetches.
    pub user_agent: String,

    /// Reject loopback, private and link-local targets. Default: true.
    pub block_private_hosts: bool,
}

impl Default for LegalityConfig {
    fn default() -> Self {
        Self {
            static_blacklist: DEFAULT_STATIC_BLACKLIST
                .iter()
                .map(|d| d.to_string())
                .collect(),
            robots_ttl_secs: 24 * 3600,
            robots_timeout_secs: 10,
            robots_fetches_per_second: 5,
            user_agent: "ScrapegateBot/1.0".to_string(),
            block_private_hosts: true,
        }
    }
}

impl LegalityConfig {
    pub fn robots_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.robots_ttl_secs)
    }

    pub fn robots_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.robots_timeout_secs)
    }

    /// Replace the static blacklist.
    pub fn with_static_blacklist(
        mut self,
        domains: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.static_blacklist = domains.into_iter().map(|d| d.into()).collect();
        self
    }

    pub fn with_private_hosts_allowed(mut self) -> Self {
        self.block_private_hosts = false;
        self
    }
}

/// Credit account lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditConfig {
    /// Days from issuance until a token expires. Default: 30.
    pub account_lifetime_days: i64,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            account_lifetime_days: 30,
        }
    }
}

impl CreditConfig {
    pub fn account_lifetime(&self) -> chrono::Duration {
        chrono::Duration::days(self.account_lifetime_days)
    }
}

/// Retention for the abuse ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseConfig {
    /// Incidents retained in memory, oldest evicted. Default: 1000.
    pub incident_capacity: usize,

    /// Audit entries retained in memory, oldest evicted. Default: 10 000.
    pub audit_capacity: usize,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            incident_capacity: 1000,
            audit_capacity: 10_000,
        }
    }
}
