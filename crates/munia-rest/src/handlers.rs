use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use munia_core::auth::{bearer_token, Caller};
use munia_core::error::Error as CoreError;
use munia_core::model::action::ReplayAction;
use munia_core::query::ingest::{CloseResponse, IngestRequest, IngestResponse};
use munia_core::query::ReplayEngine;

type AppState = Arc<ReplayEngine>;

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

pub struct AppError(CoreError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self.0 {
            CoreError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, self.0.code().to_string()),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.code().to_string()),
            other => {
                tracing::error!("internal error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({"error": msg}))).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        AppError(e)
    }
}

// ---------------------------------------------------------------------------
// Caller extraction
// ---------------------------------------------------------------------------

/// The resolved caller, or `None` for anonymous requests.
pub struct MaybeCaller(pub Option<Caller>);

impl FromRequestParts<AppState> for MaybeCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, engine: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let caller = engine.authenticate(bearer_token(header)).await?;
        Ok(MaybeCaller(caller))
    }
}

// ---------------------------------------------------------------------------
// Body helper structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ActionBatch {
    pub actions: Vec<ReplayAction>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/replay/sessions/:id/actions -- append a flushed batch.
pub async fn append_actions_handler(
    State(engine): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<String>,
    Json(batch): Json<ActionBatch>,
) -> Result<Json<IngestResponse>, AppError> {
    let response = engine
        .record(
            caller.as_ref(),
            IngestRequest {
                session_id: id,
                actions: batch.actions,
            },
        )
        .await?;
    Ok(Json(response))
}

/// POST /v1/replay/sessions/:id/close -- end a recording session.
pub async fn close_session_handler(
    State(engine): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    Path(id): Path<String>,
) -> Result<Json<CloseResponse>, AppError> {
    let response = engine.close_session(caller.as_ref(), &id).await?;
    Ok(Json(response))
}

/// GET /v1/health -- simple health check.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}
