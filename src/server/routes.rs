//! Application routing
//!
//! This module defines all HTTP routes for the application.

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::api::{generate, health, keys, metrics};
use crate::middleware::{auth::require_admin_key, logging::log_request};
use crate::middleware::{REQUEST_ID_HEADER, TRACE_ID_HEADER};
use crate::server::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/liveness", get(health::liveness))
        .route("/metrics", get(metrics::metrics));

    // Key management (admin key required when configured)
    let key_routes = Router::new()
        .route("/keys", post(keys::add_key))
        .route("/keys/status", get(keys::key_status))
        .route("/keys/:index/reset", post(keys::reset_key))
        .layer(middleware::from_fn_with_state(
            state.admin_auth(),
            require_admin_key,
        ));

    let api_routes = Router::new()
        .route("/generate", post(generate::generate))
        .merge(key_routes);

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        // Layer order: last added = outermost = runs first
        .layer(create_cors_layer(&state.settings.cors_allowed_origins))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// CORS for the configured frontend origins; `*` allows any origin
fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::RETRY_AFTER,
            HeaderName::from_static(TRACE_ID_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(600));

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}
