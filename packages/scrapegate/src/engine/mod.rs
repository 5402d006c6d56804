//! Extraction engine: a [`Renderer`] composed with the [`HtmlExtractor`].

pub mod html;
pub mod http;

use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

pub use html::HtmlExtractor;
pub use http::HttpRenderer;

use crate::error::{RenderError, RenderResult};
use crate::traits::renderer::{Extractor, Renderer};
use crate::types::options::ExtractionOptions;
use crate::types::record::{ExtractedPage, ExtractionMetadata};

/// Renders a page, then maps it to a record.
///
/// The whole render is bounded by the options' timeout, whatever the
/// renderer does internally.
pub struct ExtractionEngine<R: Renderer> {
    renderer: R,
    extractor: HtmlExtractor,
}

impl<R: Renderer> ExtractionEngine<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            extractor: HtmlExtractor::new(),
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

#[async_trait]
impl<R: Renderer> Extractor for ExtractionEngine<R> {
    async fn extract(&self, url: &str, options: &ExtractionOptions) -> RenderResult<ExtractedPage> {
        let started = Instant::now();
        let timeout = options.timeout();

        let page = tokio::time::timeout(timeout, self.renderer.render(url, options))
            .await
            .map_err(|_| RenderError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        let record = self.extractor.extract(&page, options)?;
        let metadata = ExtractionMetadata {
            final_url: page.final_url.clone(),
            status: page.status,
            duration_ms: started.elapsed().as_millis() as u64,
            bytes: page.byte_size(),
        };

        debug!(
            url,
            extraction_type = ?record.extraction_type,
            records = record.record_count(),
            duration_ms = metadata.duration_ms,
            "Page extracted"
        );

        Ok(ExtractedPage { record, metadata })
    }
}
