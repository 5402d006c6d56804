//! Per-domain robots.txt cache with throttled outbound fetches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::legality::robots::RobotsTxt;
use crate::legality::url_guard::TargetUrl;
use crate::traits::robots::{RobotsFetch, RobotsFetcher};
use crate::types::config::LegalityConfig;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub const REASON_FAIL_OPEN: &str = "no robots.txt / fetch failed";
pub const REASON_ALLOWED: &str = "allowed by robots.txt";

/// Robots verdict for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotsDecision {
    pub allowed: bool,
    pub reason: String,
    pub fetched_at: DateTime<Utc>,
}

/// A cached robots.txt: parsed rules, or `None` when unavailable.
#[derive(Debug, Clone)]
struct CachedRobots {
    rules: Option<RobotsTxt>,
    fetched_at: DateTime<Utc>,
}

/// Robots.txt fetcher over HTTP.
pub struct HttpRobotsFetcher {
    client: reqwest::Client,
}

impl HttpRobotsFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RobotsFetcher for HttpRobotsFetcher {
    async fn fetch(&self, robots_url: &str) -> RobotsFetch {
        let response = match self.client.get(robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                return RobotsFetch::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return RobotsFetch::Missing {
                status: status.as_u16(),
            };
        }

        match response.text().await {
            Ok(body) => RobotsFetch::Found(body),
            Err(e) => RobotsFetch::Failed {
                reason: e.to_string(),
            },
        }
    }
}

/// Caches parsed robots.txt per domain for a fixed TTL.
///
/// Concurrent first lookups for one domain may both fetch; the later
/// insert simply wins.
pub struct RobotsCache {
    entries: DashMap<String, CachedRobots>,
    fetcher: Arc<dyn RobotsFetcher>,
    limiter: DirectRateLimiter,
    ttl: chrono::Duration,
    timeout: Duration,
}

impl RobotsCache {
    pub fn new(fetcher: Arc<dyn RobotsFetcher>, config: &LegalityConfig) -> Self {
        let per_second = NonZeroU32::new(config.robots_fetches_per_second).unwrap_or(nonzero!(5u32));
        Self {
            entries: DashMap::new(),
            fetcher,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            ttl: config.robots_ttl(),
            timeout: config.robots_timeout(),
        }
    }

    /// Decide whether `target` may be fetched.
    pub async fn check(&self, target: &TargetUrl) -> RobotsDecision {
        self.check_at(target, Utc::now()).await
    }

    pub async fn check_at(&self, target: &TargetUrl, now: DateTime<Utc>) -> RobotsDecision {
        let cached = self
            .entries
            .get(&target.domain)
            .filter(|entry| now - entry.fetched_at < self.ttl)
            .map(|entry| entry.clone());

        let cached = match cached {
            Some(cached) => cached,
            None => {
                let fresh = self.fetch(target, now).await;
                self.entries.insert(target.domain.clone(), fresh.clone());
                fresh
            }
        };

        decide(&cached, &target.path())
    }

    async fn fetch(&self, target: &TargetUrl, now: DateTime<Utc>) -> CachedRobots {
        let robots_url = target.robots_url();

        let fetched = tokio::time::timeout(self.timeout, async {
            self.limiter.until_ready().await;
            self.fetcher.fetch(&robots_url).await
        })
        .await
        .unwrap_or_else(|_| RobotsFetch::Failed {
            reason: format!("timed out after {}s", self.timeout.as_secs()),
        });

        let rules = match fetched {
            RobotsFetch::Found(body) => {
                debug!(url = %robots_url, bytes = body.len(), "Fetched robots.txt");
                Some(RobotsTxt::parse(&body))
            }
            RobotsFetch::Missing { status } => {
                debug!(url = %robots_url, status, "No robots.txt");
                None
            }
            RobotsFetch::Failed { reason } => {
                warn!(url = %robots_url, reason = %reason, "robots.txt fetch failed, allowing");
                None
            }
        };

        CachedRobots {
            rules,
            fetched_at: now,
        }
    }

    /// Evict entries older than the TTL. Returns how many were removed.
    pub fn compact_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.fetched_at < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decide(cached: &CachedRobots, path: &str) -> RobotsDecision {
    let (allowed, reason) = match &cached.rules {
        None => (true, REASON_FAIL_OPEN.to_string()),
        Some(rules) => match rules.blocking_rule(path) {
            Some(rule) => (false, format!("disallowed by robots.txt ({rule})")),
            None => (true, REASON_ALLOWED.to_string()),
        },
    };

    RobotsDecision {
        allowed,
        reason,
        fetched_at: cached.fetched_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legality::url_guard::UrlGuard;
    use crate::testing::StaticRobotsFetcher;

    fn target(url: &str) -> TargetUrl {
        UrlGuard::new().parse(url).unwrap()
    }

    #[tokio::test]
    async fn test_caches_per_domain() {
        let fetcher = Arc::new(
            StaticRobotsFetcher::new().with_robots("example.com", "User-agent: *\nDisallow: /private\n"),
        );
        let cache = RobotsCache::new(fetcher.clone(), &LegalityConfig::default());

        let blocked = cache.check(&target("https://example.com/private/x")).await;
        assert!(!blocked.allowed);

        let allowed = cache.check(&target("https://example.com/public")).await;
        assert!(allowed.allowed);
        assert_eq!(allowed.reason, REASON_ALLOWED);

        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_open() {
        let fetcher = Arc::new(StaticRobotsFetcher::new().with_failure("down.example", "connection refused"));
        let cache = RobotsCache::new(fetcher, &LegalityConfig::default());

        let missing = cache.check(&target("https://nothing.example/a")).await;
        assert!(missing.allowed);
        assert_eq!(missing.reason, REASON_FAIL_OPEN);

        let failed = cache.check(&target("https://down.example/a")).await;
        assert!(failed.allowed);
        assert_eq!(failed.reason, REASON_FAIL_OPEN);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl() {
        let fetcher = Arc::new(StaticRobotsFetcher::new().with_robots("example.com", "User-agent: *\nDisallow: /\n"));
        let cache = RobotsCache::new(fetcher.clone(), &LegalityConfig::default());
        let start = Utc::now();

        cache.check_at(&target("https://example.com/"), start).await;
        cache
            .check_at(&target("https://example.com/"), start + chrono::Duration::hours(23))
            .await;
        assert_eq!(fetcher.fetch_count(), 1);

        cache
            .check_at(&target("https://example.com/"), start + chrono::Duration::hours(25))
            .await;
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_compaction() {
        let fetcher = Arc::new(StaticRobotsFetcher::new());
        let cache = RobotsCache::new(fetcher, &LegalityConfig::default());
        let start = Utc::now();

        cache.check_at(&target("https://a.example/"), start).await;
        cache
            .check_at(&target("https://b.example/"), start + chrono::Duration::hours(12))
            .await;

        let evicted = cache.compact_at(start + chrono::Duration::hours(30));
        assert_eq!(evicted, 1);
        assert_eq!(cache.len(), 1);
    }
}
