//! Plain HTTP renderer.
//!
//! Fetches raw markup with reqwest. No JavaScript runs, so `wait_for`
//! cannot be honored and is ignored. Redirects are never followed here;
//! each one is reported as [`RenderError::Redirected`] so the next hop goes
//! back through the legality gate.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::traits::renderer::Renderer;
use crate::types::{options::ExtractionOptions, record::RenderedPage};

/// Renderer backed by a shared `reqwest::Client`.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }

    /// Set a custom HTTP client. It should not follow redirects itself.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str, options: &ExtractionOptions) -> RenderResult<RenderedPage> {
        let timeout = options.timeout();
        if let Some(wait_for) = &options.wait_for {
            debug!(url, wait_for = %wait_for, "waitFor ignored by plain HTTP renderer");
        }

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, timeout, e))?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| redirect_target(url, value));
            if let Some(location) = location {
                debug!(url, location = %location, status = status.as_u16(), "Redirect reported");
                return Err(RenderError::Redirected {
                    url: url.to_string(),
                    location,
                });
            }
        }
        if !status.is_success() {
            return Err(RenderError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(url, timeout, e))?;

        debug!(url, final_url = %final_url, bytes = html.len(), "Page fetched");

        Ok(RenderedPage {
            url: url.to_string(),
            final_url,
            html,
            status: status.as_u16(),
            fetched_at: Utc::now(),
        })
    }
}

/// Resolve a Location header against the URL that produced it.
fn redirect_target(base: &str, location: &str) -> Option<String> {
    let base = url::Url::parse(base).ok()?;
    base.join(location.trim()).ok().map(String::from)
}

fn map_reqwest_error(url: &str, timeout: Duration, error: reqwest::Error) -> RenderError {
    if error.is_timeout() {
        RenderError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        RenderError::Navigation {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}
