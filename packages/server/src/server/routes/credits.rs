use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use scrapegate::{CreditAccount, Tier};
use serde::{Deserialize, Serialize};

use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};

/// Payment confirmation forwarded by the payment provider integration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub payment_ref: String,
    pub tier: Tier,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub access_token: String,
    pub tier: Tier,
    pub total_credits: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub tier: Tier,
    pub total_credits: u64,
    pub used_credits: u64,
    pub remaining: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<CreditAccount> for BalanceResponse {
    fn from(account: CreditAccount) -> Self {
        Self {
            tier: account.tier,
            total_credits: account.total_credits,
            used_credits: account.used_credits,
            remaining: account.remaining(),
            created_at: account.created_at,
            expires_at: account.expires_at,
        }
    }
}

/// Issue an access token for a confirmed payment.
///
/// Mounted behind the admin key; only the payment integration calls it.
pub async fn purchase_handler(
    Extension(state): Extension<AppState>,
    Json(purchase): Json<PurchaseRequest>,
) -> ApiResult<(StatusCode, Json<PurchaseResponse>)> {
    let payment_ref = purchase.payment_ref.trim();
    if payment_ref.is_empty() {
        return Err(ApiError::BadRequest("paymentRef is required".to_string()));
    }

    let token = state.gateway.issue_credits(payment_ref, purchase.tier);
    let account = state
        .gateway
        .balance(&token)
        .ok_or_else(|| ApiError::Internal("issued account missing".to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(PurchaseResponse {
            access_token: token,
            tier: account.tier,
            total_credits: account.total_credits,
            expires_at: account.expires_at,
        }),
    ))
}

pub async fn balance_handler(
    Extension(state): Extension<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<BalanceResponse>> {
    state
        .gateway
        .balance(&token)
        .map(|account| Json(account.into()))
        .ok_or_else(|| ApiError::NotFound("credit account".to_string()))
}
