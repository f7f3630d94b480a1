use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use munia_core::auth::{bearer_token, Caller};
use munia_core::error::Error as CoreError;
use munia_core::query::retrieval::{SessionActions, SessionIndex, SessionPage};
use munia_core::query::ReplayEngine;

type AppState = Arc<ReplayEngine>;

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Admin errors carry only a fixed code. The message inside a
/// `Forbidden` or `NotFound` never reaches the client, so the body for a
/// missing session is the same whatever the id was.
pub struct AdminError(CoreError);

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            other => {
                tracing::error!("admin request failed: {other}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({"error": self.0.code()}))).into_response()
    }
}

impl From<CoreError> for AdminError {
    fn from(e: CoreError) -> Self {
        AdminError(e)
    }
}

// ---------------------------------------------------------------------------
// Caller extraction
// ---------------------------------------------------------------------------

pub struct MaybeCaller(pub Option<Caller>);

impl FromRequestParts<AppState> for MaybeCaller {
    type Rejection = AdminError;

    async fn from_request_parts(parts: &mut Parts, engine: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        Ok(MaybeCaller(engine.authenticate(bearer_token(header)).await?))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /admin/api/health
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /admin/api/replay/sessions?limit=&offset=
pub async fn sessions_handler(
    State(engine): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    Query(page): Query<SessionPage>,
) -> Result<Json<SessionIndex>, AdminError> {
    Ok(Json(engine.list_sessions(caller.as_ref(), page).await?))
}

/// GET /admin/api/replay/sessions/:id
pub async fn session_actions_handler(
    State(engine): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<String>,
) -> Result<Json<SessionActions>, AdminError> {
    Ok(Json(engine.session_actions(caller.as_ref(), &id).await?))
}
