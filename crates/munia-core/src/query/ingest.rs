use serde::{Deserialize, Serialize};

use crate::auth::{require_user, Caller};
use crate::error::{Error, Result};
use crate::model::action::ReplayAction;
use crate::model::now_timestamp;
use crate::model::session::{validate_session_id, ReplaySession};
use crate::query::ReplayEngine;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub session_id: String,
    pub actions: Vec<ReplayAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestResponse {
    pub id: String,
    pub accepted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseResponse {
    pub id: String,
    pub ended_at: String,
}

fn check_owner(session: &ReplaySession, caller: &Caller) -> Result<()> {
    match session.user_id.as_deref() {
        Some(owner) if owner != caller.user_id => Err(Error::Forbidden(format!(
            "session {} belongs to another user",
            session.id
        ))),
        _ => Ok(()),
    }
}

/// Create or continue the session, then append the batch in order.
pub async fn execute(
    engine: &ReplayEngine,
    caller: Option<&Caller>,
    request: IngestRequest,
) -> Result<IngestResponse> {
    let caller = require_user(caller)?;
    validate_session_id(&request.session_id)?;
    for action in &request.actions {
        action.validate()?;
    }

    let session = engine
        .storage
        .create_or_continue_session(&ReplaySession::new(
            request.session_id.clone(),
            Some(caller.user_id.clone()),
        ))
        .await?;
    check_owner(&session, caller)?;

    let accepted = engine
        .storage
        .append_actions(&session.id, &request.actions)
        .await?;
    tracing::debug!(session_id = %session.id, accepted, "stored replay actions");

    Ok(IngestResponse {
        id: session.id,
        accepted,
    })
}

pub async fn close(
    engine: &ReplayEngine,
    caller: Option<&Caller>,
    session_id: &str,
) -> Result<CloseResponse> {
    let caller = require_user(caller)?;
    validate_session_id(session_id)?;
    let session = engine
        .storage
        .get_session(session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;
    check_owner(&session, caller)?;

    let ended_at = engine
        .storage
        .close_session(session_id, &now_timestamp())
        .await?;
    tracing::info!(session_id, ended_at = %ended_at, "replay session closed");

    Ok(CloseResponse {
        id: session_id.to_string(),
        ended_at,
    })
}
