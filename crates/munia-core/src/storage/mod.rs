pub mod duckdb;
pub mod migrations;

use crate::error::Result;
use crate::model::action::ReplayAction;
use crate::model::session::{ReplaySession, SessionSummary};

#[async_trait::async_trait]
pub trait ReplayStorage: Send + Sync {
    // Sessions
    /// Insert the session if it does not exist yet and return the stored row.
    /// An existing row is returned unchanged, so `started_at` is set by the
    /// first write only.
    async fn create_or_continue_session(&self, session: &ReplaySession) -> Result<ReplaySession>;
    async fn get_session(&self, id: &str) -> Result<Option<ReplaySession>>;
    /// Set `ended_at` on an open session. Returns the effective `ended_at`;
    /// closing an already-closed session leaves it untouched.
    async fn close_session(&self, id: &str, ended_at: &str) -> Result<String>;
    async fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<SessionSummary>>;

    // Actions
    /// Append in submission order. Returns the number of rows written.
    async fn append_actions(&self, session_id: &str, actions: &[ReplayAction]) -> Result<usize>;
    /// All actions of a session ordered by `(ts, seq)` ascending.
    async fn get_session_actions(&self, session_id: &str) -> Result<Vec<ReplayAction>>;
}
