//! Static and dynamic domain blacklist.

use indexmap::IndexSet;
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::legality::url_guard::normalize_domain;

/// Where a blacklist entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistSource {
    Static,
    Dynamic,
}

/// A blacklist hit for a queried domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistMatch {
    /// The entry that matched (the domain itself or a parent)
    pub entry: String,
    pub source: BlacklistSource,
}

/// Domain blacklist with parent-suffix matching.
///
/// Static entries come from configuration and never change. Dynamic entries
/// are added administratively, kept in insertion order for persistence.
pub struct Blacklist {
    static_entries: HashSet<String>,
    dynamic_entries: RwLock<IndexSet<String>>,
}

impl Blacklist {
    pub fn new(static_entries: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            static_entries: static_entries
                .into_iter()
                .map(|d| normalize_domain(d.as_ref()))
                .filter(|d| !d.is_empty())
                .collect(),
            dynamic_entries: RwLock::new(IndexSet::new()),
        }
    }

    /// Check a normalized domain: exact match first, then each parent suffix.
    pub async fn lookup(&self, domain: &str) -> Option<BlacklistMatch> {
        let dynamic = self.dynamic_entries.read().await;

        for candidate in domain_and_parents(domain) {
            if self.static_entries.contains(candidate) {
                return Some(BlacklistMatch {
                    entry: candidate.to_string(),
                    source: BlacklistSource::Static,
                });
            }
            if dynamic.contains(candidate) {
                return Some(BlacklistMatch {
                    entry: candidate.to_string(),
                    source: BlacklistSource::Dynamic,
                });
            }
        }

        None
    }

    /// Add a dynamic entry. Returns false if it was already present.
    pub async fn add(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        if domain.is_empty() || self.static_entries.contains(&domain) {
            return false;
        }
        self.dynamic_entries.write().await.insert(domain)
    }

    /// Replace dynamic entries with previously persisted ones.
    pub async fn restore(&self, domains: impl IntoIterator<Item = String>) {
        let mut dynamic = self.dynamic_entries.write().await;
        dynamic.clear();
        dynamic.extend(
            domains
                .into_iter()
                .map(|d| normalize_domain(&d))
                .filter(|d| !d.is_empty()),
        );
    }

    /// Dynamic entries in insertion order.
    pub async fn dynamic_entries(&self) -> Vec<String> {
        self.dynamic_entries.read().await.iter().cloned().collect()
    }

    pub fn static_count(&self) -> usize {
        self.static_entries.len()
    }

    pub async fn dynamic_count(&self) -> usize {
        self.dynamic_entries.read().await.len()
    }
}

/// `a.b.c.com` yields `a.b.c.com`, `b.c.com`, `c.com`, `com`.
fn domain_and_parents(domain: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(domain), |&d| d.split_once('.').map(|(_, parent)| parent))
        .filter(|d| !d.is_empty())
}
