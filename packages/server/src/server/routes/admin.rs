//! Administrative routes. Mounted behind [`require_admin_key`].
//!
//! [`require_admin_key`]: crate::server::middleware::require_admin_key

use axum::{
    extract::{Extension, Query},
    Json,
};
use scrapegate::{AbuseIncident, AuditEntry, BanState, GatewayStats};
use serde::{Deserialize, Serialize};

use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub caller: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnbanRequest {
    pub caller: String,
}

#[derive(Debug, Deserialize)]
pub struct BlacklistRequest {
    pub domain: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BanStateResponse {
    pub caller: String,
    pub state: BanState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlacklistResponse {
    pub domain: String,
    pub added: bool,
}

fn required(value: &str, field: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub async fn ban_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<BanRequest>,
) -> ApiResult<Json<BanStateResponse>> {
    let caller = required(&body.caller, "caller")?;
    let reason = body
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("administrator");

    state.gateway.ban(&caller, reason).await;

    Ok(Json(BanStateResponse {
        state: state.gateway.ban_state(&caller),
        caller,
        changed: None,
    }))
}

pub async fn unban_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<UnbanRequest>,
) -> ApiResult<Json<BanStateResponse>> {
    let caller = required(&body.caller, "caller")?;
    let changed = state.gateway.unban(&caller).await;

    Ok(Json(BanStateResponse {
        state: state.gateway.ban_state(&caller),
        caller,
        changed: Some(changed),
    }))
}

pub async fn blacklist_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<BlacklistRequest>,
) -> ApiResult<Json<BlacklistResponse>> {
    let domain = required(&body.domain, "domain")?;
    let added = state.gateway.add_to_blacklist(&domain).await;

    Ok(Json(BlacklistResponse { domain, added }))
}

pub async fn incidents_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<AbuseIncident>> {
    Json(state.gateway.recent_incidents(query.limit()).await)
}

pub async fn requests_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<AuditEntry>> {
    Json(state.gateway.recent_requests(query.limit()).await)
}

pub async fn stats_handler(Extension(state): Extension<AppState>) -> Json<GatewayStats> {
    Json(state.gateway.stats().await)
}
