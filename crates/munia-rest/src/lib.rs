pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use munia_core::query::ReplayEngine;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Construct the Axum router for the replay ingest API.
///
/// This is the persistence boundary the browser-side command buffer
/// flushes into. All routes are nested under `/v1/` and the router carries
/// `Arc<ReplayEngine>` as shared state.
///
/// CORS is restrictive by default (localhost only). Set the
/// `MUNIA_CORS_ORIGINS` environment variable to a comma-separated
/// list of allowed origins to override (e.g. `https://munia.example.com`).
/// Set it to `*` to allow all origins (not recommended for production).
pub fn router(engine: Arc<ReplayEngine>) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .route(
            "/v1/replay/sessions/{id}/actions",
            post(handlers::append_actions_handler),
        )
        .route(
            "/v1/replay/sessions/{id}/close",
            post(handlers::close_session_handler),
        )
        .route("/v1/health", get(handlers::health_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max batch
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(engine)
}

fn build_cors_layer() -> CorsLayer {
    use axum::http::{HeaderName, Method};

    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ])
        .max_age(std::time::Duration::from_secs(3600));

    match std::env::var("MUNIA_CORS_ORIGINS") {
        Ok(val) if val == "*" => base.allow_origin(AllowOrigin::any()),
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            base.allow_origin(origins)
        }
        Err(_) => {
            let origins: Vec<_> = [
                "http://localhost:3000",
                "http://127.0.0.1:3000",
            ]
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
            base.allow_origin(origins)
        }
    }
}
