//! Application setup and server configuration.

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use scrapegate::{AdminKey, AdmissionGateway};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::middleware::{
    extract_client_ip, require_admin_key, TrustedProxies, ADMIN_KEY_HEADER,
};
use crate::server::routes::{
    balance_handler, ban_handler, blacklist_handler, health_handler, incidents_handler,
    purchase_handler, requests_handler, scrape_handler, stats_handler, unban_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: AdmissionGateway,
    pub admin_key: AdminKey,
    pub trusted_proxies: TrustedProxies,
}

impl AppState {
    pub fn new(gateway: AdmissionGateway, admin_key: AdminKey) -> Self {
        Self {
            gateway,
            admin_key,
            trusted_proxies: TrustedProxies::default(),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.trusted_proxies = proxies;
        self
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(ADMIN_KEY_HEADER)])
}

/// Build the Axum application router
///
/// An empty `allowed_origins` list allows any origin. Credit purchases
/// come from the payment integration and carry the admin key.
pub fn build_app(state: AppState, allowed_origins: &[String]) -> Router {
    let admin_key = state.admin_key.clone();
    let proxies = state.trusted_proxies.clone();

    let admin = Router::new()
        .route("/api/credits/purchase", post(purchase_handler))
        .route("/admin/ban", post(ban_handler))
        .route("/admin/unban", post(unban_handler))
        .route("/admin/blacklist", post(blacklist_handler))
        .route("/admin/incidents", get(incidents_handler))
        .route("/admin/requests", get(requests_handler))
        .route("/admin/stats", get(stats_handler))
        .route_layer(middleware::from_fn(move |req, next| {
            require_admin_key(admin_key.clone(), req, next)
        }));

    Router::new()
        .route("/api/scrape", post(scrape_handler))
        .route("/api/credits/:token", get(balance_handler))
        .route("/health", get(health_handler))
        .merge(admin)
        .layer(middleware::from_fn(move |req, next| {
            extract_client_ip(proxies.clone(), req, next)
        }))
        .layer(Extension(state)) // Add shared state (must be after middlewares that need it)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}
