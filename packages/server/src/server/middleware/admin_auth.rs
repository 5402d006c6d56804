use axum::{extract::Request, middleware::Next, response::IntoResponse, response::Response};
use scrapegate::AdminKey;
use tracing::warn;

use crate::server::error::ApiError;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Reject requests that do not carry the configured admin key.
pub async fn require_admin_key(admin_key: AdminKey, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !admin_key.verify(presented) {
        warn!(path = %request.uri().path(), "Admin request rejected");
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}
