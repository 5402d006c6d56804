//! Extraction options accepted at the gateway boundary.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::GatewayError;

/// Default render timeout when the caller sets none.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Smallest accepted render timeout.
pub const MIN_TIMEOUT_MS: u64 = 1_000;

/// Largest accepted render timeout.
pub const MAX_TIMEOUT_MS: u64 = 60_000;

/// Which record shape the extractor should aim for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionType {
    /// Pick a shape from what the page looks like.
    #[default]
    Auto,
    Article,
    Product,
    Listing,
}

/// Options for a single extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOptions {
    /// CSS selector; each matched element becomes one item.
    #[serde(default)]
    pub selector: Option<String>,

    /// Selector the renderer should wait for before snapshotting.
    #[serde(default)]
    pub wait_for: Option<String>,

    #[serde(default, rename = "type")]
    pub extraction_type: ExtractionType,

    /// Render timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ExtractionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_wait_for(mut self, wait_for: impl Into<String>) -> Self {
        self.wait_for = Some(wait_for.into());
        self
    }

    pub fn with_type(mut self, extraction_type: ExtractionType) -> Self {
        self.extraction_type = extraction_type;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Effective render timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    /// Validate and normalize the options.
    ///
    /// Blank selectors are dropped; malformed selectors and out-of-range
    /// timeouts are rejected.
    pub fn validate(mut self) -> Result<Self, GatewayError> {
        self.selector = normalize_selector(self.selector.take(), "selector")?;
        self.wait_for = normalize_selector(self.wait_for.take(), "waitFor")?;

        if let Some(timeout) = self.timeout_ms {
            if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout) {
                return Err(GatewayError::invalid_input(format!(
                    "timeoutMs must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}, got {timeout}"
                )));
            }
        }

        Ok(self)
    }
}

fn normalize_selector(value: Option<String>, field: &str) -> Result<Option<String>, GatewayError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    scraper::Selector::parse(trimmed)
        .map_err(|e| GatewayError::invalid_input(format!("{field} is not a valid selector: {e}")))?;
    Ok(Some(trimmed.to_string()))
}
