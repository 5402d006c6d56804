//! Record shapes produced by the extraction engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::options::ExtractionType;

/// Markup returned by a renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedPage {
    /// URL that was requested
    pub url: String,

    /// URL after redirects
    pub final_url: String,

    /// Rendered DOM or raw markup
    pub html: String,

    /// HTTP status of the main document
    pub status: u16,

    /// When rendering finished
    pub fetched_at: DateTime<Utc>,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            html: html.into(),
            status: 200,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn byte_size(&self) -> usize {
        self.html.len()
    }
}

/// A single extracted item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordItem {
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl RecordItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Product fields found on a product-like page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
}

/// Structured record mapped from a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub url: String,

    /// Shape the extractor settled on (never `Auto`).
    #[serde(rename = "type")]
    pub extraction_type: ExtractionType,

    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical_url: Option<String>,
    pub language: Option<String>,

    #[serde(default)]
    pub headings: Vec<String>,

    #[serde(default)]
    pub items: Vec<RecordItem>,

    #[serde(default)]
    pub links: Vec<String>,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductInfo>,

    /// SHA-256 of the source markup
    pub content_hash: String,
}

impl ScrapedRecord {
    pub fn new(url: impl Into<String>, extraction_type: ExtractionType, html: &str) -> Self {
        Self {
            url: url.into(),
            extraction_type,
            title: None,
            description: None,
            canonical_url: None,
            language: None,
            headings: Vec::new(),
            items: Vec::new(),
            links: Vec::new(),
            images: Vec::new(),
            product: None,
            content_hash: hash_content(html),
        }
    }

    /// Number of records for settlement purposes.
    pub fn record_count(&self) -> usize {
        self.items.len()
    }
}

/// Calculate SHA-256 hash of content.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Timing and size of an extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    pub final_url: String,
    pub status: u16,
    pub duration_ms: u64,
    pub bytes: usize,
}

/// Successful output of the extraction engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub record: ScrapedRecord,
    pub metadata: ExtractionMetadata,
}

/// Settlement input consumed by the credit and abuse ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOutcome {
    pub success: bool,
    pub record_count: usize,
    pub error_kind: Option<String>,
}

impl ScrapeOutcome {
    pub fn succeeded(record_count: usize) -> Self {
        Self {
            success: true,
            record_count,
            error_kind: None,
        }
    }

    pub fn failed(error_kind: impl Into<String>) -> Self {
        Self {
            success: false,
            record_count: 0,
            error_kind: Some(error_kind.into()),
        }
    }
}
