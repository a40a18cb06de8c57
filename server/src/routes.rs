//! Route definitions for the oracle HTTP surface

use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::handlers::{api_info, health_check};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api", get(api_info))
        .route("/health", get(health_check))
}

/// Full router with CORS and request tracing.
pub fn app(state: AppState, allowed_origins: &str) -> Router {
    api_routes()
        .layer(build_cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &str) -> CorsLayer {
    let allowed_origins = allowed_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(false)
}
