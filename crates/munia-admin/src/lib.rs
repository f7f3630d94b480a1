pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use munia_core::query::ReplayEngine;

/// Construct the Axum router for the administrator replay API.
///
/// Every route under `/admin/api/replay/` resolves the caller from the
/// `Authorization: Bearer` header and requires the administrator role
/// before touching storage. The router carries `Arc<ReplayEngine>` as
/// shared state.
///
/// # Routes
///
/// | Method | Path                                | Description                   |
/// |--------|-------------------------------------|-------------------------------|
/// | GET    | `/admin/api/health`                 | Health check                  |
/// | GET    | `/admin/api/replay/sessions`        | Session index, newest first, paged by `limit` / `offset` |
/// | GET    | `/admin/api/replay/sessions/:id`    | Stored action log of a session |
pub fn router(engine: Arc<ReplayEngine>) -> Router {
    Router::new()
        .route("/admin/api/health", get(handlers::health_handler))
        .route("/admin/api/replay/sessions", get(handlers::sessions_handler))
        .route(
            "/admin/api/replay/sessions/{id}",
            get(handlers::session_actions_handler),
        )
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(engine)
}
