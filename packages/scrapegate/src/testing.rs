//! Testing utilities including mock implementations.
//!
//! These let applications exercise the gateway without touching the network:
//! [`MockRenderer`] serves canned markup and [`StaticRobotsFetcher`] serves
//! canned robots.txt files.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{RenderError, RenderResult};
use crate::traits::renderer::Renderer;
use crate::traits::robots::{RobotsFetch, RobotsFetcher};
use crate::types::{options::ExtractionOptions, record::RenderedPage};

#[derive(Debug, Clone)]
enum MockPage {
    Html(String),
    Failure(RenderError),
    Panic,
}

/// A mock renderer for testing.
///
/// Unknown URLs fail with a navigation error.
#[derive(Default, Clone)]
pub struct MockRenderer {
    pages: Arc<RwLock<HashMap<String, MockPage>>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `url`.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.insert(url.into(), MockPage::Html(html.into()));
        self
    }

    /// Fail rendering of `url` with `error`.
    pub fn with_failure(self, url: impl Into<String>, error: RenderError) -> Self {
        self.insert(url.into(), MockPage::Failure(error));
        self
    }

    /// Answer `url` with a redirect to `location`.
    pub fn with_redirect(self, url: impl Into<String>, location: impl Into<String>) -> Self {
        let url = url.into();
        let error = RenderError::Redirected {
            url: url.clone(),
            location: location.into(),
        };
        self.insert(url, MockPage::Failure(error));
        self
    }

    /// Panic while rendering `url`.
    pub fn with_panic(self, url: impl Into<String>) -> Self {
        self.insert(url.into(), MockPage::Panic);
        self
    }

    /// Sleep before answering every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs rendered so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn insert(&self, url: String, page: MockPage) {
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url, page);
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, url: &str, _options: &ExtractionOptions) -> RenderResult<RenderedPage> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let page = self
            .pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();

        match page {
            Some(MockPage::Html(html)) => Ok(RenderedPage::new(url, html)),
            Some(MockPage::Failure(error)) => Err(error),
            Some(MockPage::Panic) => panic!("mock renderer panic for {url}"),
            None => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: "no mock page registered".to_string(),
            }),
        }
    }
}

/// Serves robots.txt bodies keyed by host.
///
/// Hosts without a registered body answer 404.
#[derive(Default)]
pub struct StaticRobotsFetcher {
    bodies: HashMap<String, RobotsFetch>,
    fetches: AtomicUsize,
}

impl StaticRobotsFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_robots(mut self, host: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(host.into(), RobotsFetch::Found(body.into()));
        self
    }

    pub fn with_failure(mut self, host: impl Into<String>, reason: impl Into<String>) -> Self {
        self.bodies.insert(
            host.into(),
            RobotsFetch::Failed {
                reason: reason.into(),
            },
        );
        self
    }

    /// Number of fetches served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RobotsFetcher for StaticRobotsFetcher {
    async fn fetch(&self, robots_url: &str) -> RobotsFetch {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let host = url::Url::parse(robots_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default();
        let host = host.strip_prefix("www.").unwrap_or(&host);

        self.bodies
            .get(host)
            .cloned()
            .unwrap_or(RobotsFetch::Missing { status: 404 })
    }
}

/// Canned pages for extractor tests.
pub mod fixtures {
    pub const ARTICLE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <title>Fallback Title</title>
  <meta property="og:title" content="Rivers in Spring">
  <meta name="description" content="Notes on seasonal river levels.">
  <link rel="canonical" href="https://news.example.com/rivers">
</head>
<body>
  <nav><a href="/">Home</a></nav>
  <article>
    <h1>Rivers in Spring</h1>
    <p>Snowmelt raises river levels across the valley every April, and the fords close for weeks.</p>
    <h2>Measurements</h2>
    <p>Gauges upstream reported a rise of forty centimetres within two days of the first warm spell.</p>
    <p>Short.</p>
    <img src="/img/river.jpg" alt="river">
    <a href="https://other.example.org/gauges">Gauge data</a>
    <a href="/archive">Archive</a>
    <a href="/archive">Archive again</a>
  </article>
</body>
</html>"#;

    pub const PRODUCT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Trail Kettle | Outfitters</title>
  <meta property="product:price:currency" content="EUR">
</head>
<body>
  <div class="product">
    <h1 class="product-title">Trail Kettle</h1>
    <span class="price">€24.90</span>
    <img src="https://cdn.example.com/kettle.png">
    <p>A light titanium kettle for two.</p>
  </div>
</body>
</html>"#;

    pub const LISTING_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Open Positions</title></head>
<body>
  <ul class="results">
    <li><a href="/jobs/1">Volunteer Driver</a></li>
    <li><a href="/jobs/2">Food Bank Helper</a></li>
    <li><a href="/jobs/3">Reading Tutor</a></li>
    <li><a href="/jobs/4">Shelter Night Staff</a></li>
  </ul>
</body>
</html>"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_renderer() {
        let renderer = MockRenderer::new()
            .with_page("https://example.com/", "<p>hi</p>")
            .with_failure(
                "https://example.com/slow",
                RenderError::Timeout {
                    url: "https://example.com/slow".into(),
                    timeout_ms: 1000,
                },
            );
        let options = ExtractionOptions::default();

        let page = renderer.render("https://example.com/", &options).await.unwrap();
        assert_eq!(page.html, "<p>hi</p>");
        assert!(renderer.render("https://example.com/slow", &options).await.is_err());
        assert!(renderer.render("https://unknown.example/", &options).await.is_err());
        assert_eq!(renderer.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_static_robots_fetcher() {
        let fetcher = StaticRobotsFetcher::new().with_robots("example.com", "User-agent: *");

        assert_eq!(
            fetcher.fetch("https://www.example.com/robots.txt").await,
            RobotsFetch::Found("User-agent: *".into())
        );
        assert_eq!(
            fetcher.fetch("https://elsewhere.example/robots.txt").await,
            RobotsFetch::Missing { status: 404 }
        );
        assert_eq!(fetcher.fetch_count(), 2);
    }
}
