//! Renderer and extractor traits.
//!
//! The page-rendering engine (headless browser or plain HTTP) is an external
//! collaborator. The gateway only depends on [`Extractor`], which turns a URL
//! into a structured record or a typed failure.

use async_trait::async_trait;

use crate::error::RenderResult;
use crate::types::{
    options::ExtractionOptions,
    record::{ExtractedPage, RenderedPage},
};

/// Renders a page and returns its markup.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `url`, honoring the wait condition and timeout in `options`.
    async fn render(&self, url: &str, options: &ExtractionOptions) -> RenderResult<RenderedPage>;
}

/// The extraction engine contract consumed by the gateway.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str, options: &ExtractionOptions) -> RenderResult<ExtractedPage>;
}
