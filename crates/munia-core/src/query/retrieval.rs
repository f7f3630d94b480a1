use serde::{Deserialize, Serialize};

use crate::auth::{require_admin, Caller};
use crate::error::Result;
use crate::model::action::ReplayAction;
use crate::model::session::SessionSummary;
use crate::query::ReplayEngine;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndexEntry {
    pub id: String,
    pub action_count: u64,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl From<SessionSummary> for SessionIndexEntry {
    fn from(s: SessionSummary) -> Self {
        Self {
            id: s.id,
            action_count: s.action_count,
            started_at: s.started_at,
            ended_at: s.ended_at,
        }
    }
}

/// One page of the session index. `has_more` is set when sessions exist
/// past `offset + limit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndex {
    pub sessions: Vec<SessionIndexEntry>,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Paging parameters for the session index. A missing or oversized limit
/// becomes the engine's index limit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionPage {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A session's log in its stored short-key form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionActions {
    pub id: String,
    pub actions: Vec<ReplayAction>,
}

// The role check runs before any storage call in both operations, so a
// non-admin learns nothing about which ids exist.

pub async fn list_sessions(
    engine: &ReplayEngine,
    caller: Option<&Caller>,
    page: SessionPage,
) -> Result<SessionIndex> {
    require_admin(caller)?;
    let limit = page
        .limit
        .unwrap_or(engine.index_limit)
        .clamp(1, engine.index_limit.max(1));
    let offset = page.offset.unwrap_or(0);

    // Fetch one extra so we can tell if there are more pages.
    let mut sessions = engine.storage.list_sessions(limit + 1, offset).await?;
    let has_more = sessions.len() > limit;
    sessions.truncate(limit);

    Ok(SessionIndex {
        sessions: sessions.into_iter().map(SessionIndexEntry::from).collect(),
        limit,
        offset,
        has_more,
    })
}

pub async fn session_actions(
    engine: &ReplayEngine,
    caller: Option<&Caller>,
    session_id: &str,
) -> Result<SessionActions> {
    let admin = require_admin(caller)?;
    let actions = engine.storage.get_session_actions(session_id).await?;
    tracing::info!(admin = %admin.user_id, session_id, count = actions.len(), "replay log fetched");
    Ok(SessionActions {
        id: session_id.to_string(),
        actions,
    })
}
