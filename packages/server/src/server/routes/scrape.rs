use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scrapegate::ScrapeRequest;

use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::ClientIp;

/// Caller identity used when no address could be determined.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Run one request through the admission pipeline.
///
/// The status code mirrors the gateway outcome: 200, 400, 402, 403, 429 or 500.
pub async fn scrape_handler(
    Extension(state): Extension<AppState>,
    client_ip: Option<Extension<ClientIp>>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return ApiError::BadRequest(rejection.body_text()).into_response(),
    };

    let caller = client_ip
        .map(|Extension(ip)| ip.caller())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string());

    let response = state.gateway.handle(&caller, request).await;
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (status, Json(response)).into_response()
}
