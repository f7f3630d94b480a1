use munia_core::error::{Error, Result};
use munia_core::model::action::ReplayAction;
use munia_core::model::session::{ReplaySession, SessionSummary};
use munia_core::storage::ReplayStorage;
use sqlx::Row;

/// PostgreSQL-backed replay storage.
///
/// Wraps a `sqlx::PgPool` and runs schema migrations on construction.
/// Appends lock the session row for the length of the transaction, so
/// concurrent batches for one session get contiguous sequence numbers.
pub struct PgStorage {
    pool: sqlx::PgPool,
}

impl PgStorage {
    /// Connect to a PostgreSQL database and run migrations.
    ///
    /// `url` is a standard `postgres://` connection string.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::PgPool::connect(url).await.map_err(map_sqlx)?;
        crate::migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Build a `PgStorage` from an existing pool (useful for tests).
    pub async fn from_pool(pool: sqlx::PgPool) -> Result<Self> {
        crate::migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn map_sqlx(e: sqlx::Error) -> Error {
    Error::Persistence(e.to_string())
}

fn row_to_session(row: &sqlx::postgres::PgRow) -> ReplaySession {
    ReplaySession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
    }
}

fn row_to_action(row: &sqlx::postgres::PgRow) -> Result<ReplayAction> {
    let ts: i64 = row.get("ts");
    let timestamp = u64::try_from(ts)
        .map_err(|_| Error::Persistence(format!("negative timestamp {ts} in replay_actions")))?;
    let data: Option<serde_json::Value> = row.get("d");
    Ok(ReplayAction {
        kind: row.get("t"),
        timestamp,
        data: data.unwrap_or(serde_json::Value::Null),
    })
}

const SELECT_SESSION: &str =
    "SELECT id, user_id, started_at, ended_at FROM replay_sessions WHERE id = $1";

// ---------------------------------------------------------------------------
// ReplayStorage
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl ReplayStorage for PgStorage {
    async fn create_or_continue_session(&self, session: &ReplaySession) -> Result<ReplaySession> {
        sqlx::query(
            "INSERT INTO replay_sessions (id, user_id, started_at, ended_at) VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.started_at)
        .bind(&session.ended_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let row = sqlx::query(SELECT_SESSION)
            .bind(&session.id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row_to_session(&row))
    }

    async fn get_session(&self, id: &str) -> Result<Option<ReplaySession>> {
        let row = sqlx::query(SELECT_SESSION)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn close_session(&self, id: &str, ended_at: &str) -> Result<String> {
        // COALESCE keeps the first close time on repeated calls.
        let row = sqlx::query(
            "UPDATE replay_sessions SET ended_at = COALESCE(ended_at, $1) WHERE id = $2 RETURNING ended_at",
        )
        .bind(ended_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| Error::NotFound(format!("session {id} not found")))?;
        let ended: Option<String> = row.get("ended_at");
        ended.ok_or_else(|| Error::Persistence(format!("session {id} did not close")))
    }

    async fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
SELECT s.id, s.user_id, s.started_at, s.ended_at, COUNT(a.seq) AS action_count
FROM replay_sessions s LEFT JOIN replay_actions a ON a.session_id = s.id
GROUP BY s.id, s.user_id, s.started_at, s.ended_at
ORDER BY s.started_at DESC, s.id DESC
LIMIT $1 OFFSET $2
"#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .iter()
            .map(|row| SessionSummary {
                id: row.get("id"),
                user_id: row.get("user_id"),
                started_at: row.get("started_at"),
                ended_at: row.get("ended_at"),
                action_count: row.get::<i64, _>("action_count") as u64,
            })
            .collect())
    }

    async fn append_actions(&self, session_id: &str, actions: &[ReplayAction]) -> Result<usize> {
        for action in actions {
            action.validate()?;
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let session = sqlx::query(
            "SELECT id, user_id, started_at, ended_at FROM replay_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .map(|row| row_to_session(&row))
        .ok_or_else(|| Error::Persistence(format!("session {session_id} does not exist")))?;
        if session.is_closed() {
            return Err(Error::Validation(format!("session {session_id} is closed")));
        }
        if actions.is_empty() {
            return Ok(0);
        }

        let last_seq: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq), -1) AS last_seq FROM replay_actions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .get("last_seq");

        for (i, action) in actions.iter().enumerate() {
            sqlx::query("INSERT INTO replay_actions (session_id, seq, t, ts, d) VALUES ($1, $2, $3, $4, $5)")
                .bind(session_id)
                .bind(last_seq + 1 + i as i64)
                .bind(&action.kind)
                .bind(action.timestamp as i64)
                .bind(&action.data)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }
        tx.commit().await.map_err(map_sqlx)?;
        tracing::debug!(session_id, count = actions.len(), "appended replay actions");
        Ok(actions.len())
    }

    async fn get_session_actions(&self, session_id: &str) -> Result<Vec<ReplayAction>> {
        if self.get_session(session_id).await?.is_none() {
            return Err(Error::NotFound(format!("session {session_id} not found")));
        }
        let rows = sqlx::query(
            "SELECT t, ts, d FROM replay_actions WHERE session_id = $1 ORDER BY ts ASC, seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(row_to_action).collect()
    }
}
