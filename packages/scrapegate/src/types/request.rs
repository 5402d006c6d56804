//! Admission request and response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::types::options::ExtractionOptions;
use crate::types::record::{ExtractionMetadata, ScrapedRecord};
use crate::types::tier::Tier;

/// An inbound scrape request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub url: String,
    pub access_token: String,
    pub tier: Tier,
    #[serde(default)]
    pub options: ExtractionOptions,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>, access_token: impl Into<String>, tier: Tier) -> Self {
        Self {
            url: url.into(),
            access_token: access_token.into(),
            tier,
            options: ExtractionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Stages a request passes through inside the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStage {
    Received,
    RateChecked,
    LegalityChecked,
    CreditReserved,
    Extracted,
    Settled,
}

/// Terminal state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    DeniedAtBan,
    DeniedAtInput,
    DeniedAtRate,
    DeniedAtLegality,
    DeniedAtCredit,
    SettledSuccess,
    SettledFailureRefunded,
}

/// What happened to the caller's credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Charged,
    Refunded,
    NotCharged,
}

/// Balance echoed back with every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSummary {
    pub remaining: u64,
    pub tier: Tier,
}

/// Error body of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(error: &GatewayError) -> Self {
        let reset_time = match error {
            GatewayError::RateLimited { reset_time, .. } => *reset_time,
            _ => None,
        };
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            reset_time,
        }
    }
}

/// Response returned for every admission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub success: bool,

    #[serde(skip)]
    pub status_code: u16,

    pub disposition: Disposition,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ScrapedRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExtractionMetadata>,

    pub credits: CreditSummary,

    pub credit_status: CreditStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_refunded: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ScrapeResponse {
    pub fn success(
        record: ScrapedRecord,
        metadata: ExtractionMetadata,
        credits: CreditSummary,
    ) -> Self {
        Self {
            success: true,
            status_code: 200,
            disposition: Disposition::SettledSuccess,
            data: Some(record),
            metadata: Some(metadata),
            credits,
            credit_status: CreditStatus::Charged,
            credit_refunded: None,
            error: None,
        }
    }

    /// A denial before any credit was taken.
    pub fn denied(disposition: Disposition, error: &GatewayError, credits: CreditSummary) -> Self {
        Self {
            success: false,
            status_code: error.status_code(),
            disposition,
            data: None,
            metadata: None,
            credits,
            credit_status: CreditStatus::NotCharged,
            credit_refunded: None,
            error: Some(ErrorBody::from(error)),
        }
    }

    /// A failure after the credit was consumed and then returned.
    pub fn refunded(error: &GatewayError, credits: CreditSummary) -> Self {
        let mut body = ErrorBody::from(error);
        body.message = format!("{}; credit refunded", body.message);
        Self {
            success: false,
            status_code: error.status_code(),
            disposition: Disposition::SettledFailureRefunded,
            data: None,
            metadata: None,
            credits,
            credit_status: CreditStatus::Refunded,
            credit_refunded: Some(true),
            error: Some(body),
        }
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}
