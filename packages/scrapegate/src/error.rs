//! Typed errors for the admission gateway.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned across the gateway boundary.
///
/// Every denial path maps to exactly one variant, and every variant
/// carries a human-readable reason.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// Malformed request (missing fields, bad options). Not retried.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Blacklist or robots.txt denial. The same URL must not be retried.
    #[error("legality check failed: {reason}")]
    LegalityDenied { reason: String },

    /// Caller or domain exceeded its request window.
    #[error("rate limited: {reason}")]
    RateLimited {
        reason: String,
        reset_time: Option<DateTime<Utc>>,
    },

    /// Caller is banned and must appeal out-of-band.
    #[error("caller banned: {reason}")]
    Banned { reason: String },

    /// Token unknown, expired, or out of credits.
    #[error("insufficient credit: {reason}")]
    InsufficientCredit { reason: String, remaining: u64 },

    /// Rendering or extraction failed. The credit was refunded.
    #[error("extraction failed: {reason}")]
    ExtractionFailed { reason: String },

    /// Unexpected fault. The credit was refunded.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl GatewayError {
    /// HTTP-class status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidInput { .. } | GatewayError::LegalityDenied { .. } => 400,
            GatewayError::InsufficientCredit { .. } => 402,
            GatewayError::Banned { .. } => 403,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::ExtractionFailed { .. } | GatewayError::Internal { .. } => 500,
        }
    }

    /// Whether the caller may issue the same request again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. }
                | GatewayError::ExtractionFailed { .. }
                | GatewayError::Internal { .. }
        )
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidInput { .. } => "invalid_input",
            GatewayError::LegalityDenied { .. } => "legality_denied",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Banned { .. } => "banned",
            GatewayError::InsufficientCredit { .. } => "insufficient_credit",
            GatewayError::ExtractionFailed { .. } => "extraction_failed",
            GatewayError::Internal { .. } => "internal_error",
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        GatewayError::InvalidInput {
            reason: reason.into(),
        }
    }
}

/// Failures produced by a [`Renderer`](crate::traits::renderer::Renderer).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    /// Navigation failed (DNS, connection refused, TLS).
    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// The page did not finish rendering in time.
    #[error("timeout rendering {url} after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The server redirected; the next hop has not been checked yet.
    #[error("{url} redirects to {location}")]
    Redirected { url: String, location: String },

    /// The caller went away before rendering finished.
    #[error("render cancelled")]
    Cancelled,

    /// Rendered markup could not be mapped to a record.
    #[error("extraction error: {0}")]
    Extraction(String),
}

impl RenderError {
    /// Short error kind recorded in [`ScrapeOutcome`](crate::types::record::ScrapeOutcome).
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Navigation { .. } => "navigation",
            RenderError::Timeout { .. } => "timeout",
            RenderError::HttpStatus { .. } => "http_status",
            RenderError::Redirected { .. } => "redirect",
            RenderError::Cancelled => "cancelled",
            RenderError::Extraction(_) => "extraction",
        }
    }
}

/// Why a credit consume was refused.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CreditDenial {
    #[error("invalid token")]
    InvalidToken,

    #[error("expired")]
    Expired,

    #[error("insufficient credits")]
    InsufficientCredits { remaining: u64 },
}

impl CreditDenial {
    pub fn remaining(&self) -> u64 {
        match self {
            CreditDenial::InsufficientCredits { remaining } => *remaining,
            _ => 0,
        }
    }
}

/// Errors from a [`LedgerStore`](crate::traits::store::LedgerStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for render operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(GatewayError::invalid_input("x").status_code(), 400);
        assert_eq!(
            GatewayError::Banned {
                reason: "x".into()
            }
            .status_code(),
            403
        );
        assert_eq!(
            GatewayError::RateLimited {
                reason: "x".into(),
                reset_time: None
            }
            .status_code(),
            429
        );
        assert_eq!(
            GatewayError::InsufficientCredit {
                reason: "x".into(),
                remaining: 0
            }
            .status_code(),
            402
        );
    }

    #[test]
    fn test_retryable() {
        assert!(GatewayError::ExtractionFailed {
            reason: "timeout".into()
        }
        .is_retryable());
        assert!(!GatewayError::LegalityDenied {
            reason: "blacklisted".into()
        }
        .is_retryable());
    }
}
