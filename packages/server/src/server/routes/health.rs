use axum::{extract::Extension, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    version: String,
    robots_cached: usize,
    dynamic_blacklist: usize,
}

/// Health check endpoint
///
/// The gateway is in-process, so a response means it is up.
pub async fn health_handler(Extension(state): Extension<AppState>) -> Json<HealthResponse> {
    let legality = state.gateway.legality();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        robots_cached: legality.robots().len(),
        dynamic_blacklist: legality.blacklist().dynamic_count().await,
    })
}
