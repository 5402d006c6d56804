//! Outbound robots.txt fetching.

use async_trait::async_trait;

/// Result of fetching a robots.txt file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsFetch {
    /// 200 response with body
    Found(String),

    /// Any non-200 response
    Missing { status: u16 },

    /// Network failure or timeout
    Failed { reason: String },
}

/// Fetches robots.txt documents.
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch(&self, robots_url: &str) -> RobotsFetch;
}
