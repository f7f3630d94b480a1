use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::action::ReplayAction;
use crate::model::session::{ReplaySession, SessionSummary};
use crate::storage::ReplayStorage;

pub struct DuckDbStorage {
    conn: Arc<Mutex<duckdb::Connection>>,
}

impl DuckDbStorage {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = duckdb::Connection::open(path)?;
        super::migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = duckdb::Connection::open_in_memory()?;
        super::migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn row_to_session(row: &duckdb::Row<'_>) -> duckdb::Result<ReplaySession> {
    Ok(ReplaySession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
    })
}

fn query_session(conn: &duckdb::Connection, id: &str) -> Result<Option<ReplaySession>> {
    let mut stmt =
        conn.prepare("SELECT id, user_id, started_at, ended_at FROM replay_sessions WHERE id = ?")?;
    match stmt.query_row([id], row_to_session) {
        Ok(session) => Ok(Some(session)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::Persistence(e.to_string())),
    }
}

fn to_action(kind: String, ts: i64, data: Option<String>) -> Result<ReplayAction> {
    let timestamp = u64::try_from(ts)
        .map_err(|_| Error::Persistence(format!("negative timestamp {ts} in replay_actions")))?;
    let data = match data {
        Some(s) => serde_json::from_str(&s)?,
        None => serde_json::Value::Null,
    };
    Ok(ReplayAction {
        kind,
        timestamp,
        data,
    })
}

#[async_trait::async_trait]
impl ReplayStorage for DuckDbStorage {
    async fn create_or_continue_session(&self, session: &ReplaySession) -> Result<ReplaySession> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO replay_sessions (id, user_id, started_at, ended_at) VALUES (?, ?, ?, ?) ON CONFLICT (id) DO NOTHING",
            duckdb::params![
                session.id,
                session.user_id,
                session.started_at,
                session.ended_at,
            ],
        )?;
        query_session(&conn, &session.id)?
            .ok_or_else(|| Error::Persistence(format!("session {} vanished after insert", session.id)))
    }

    async fn get_session(&self, id: &str) -> Result<Option<ReplaySession>> {
        let conn = self.conn.lock().await;
        query_session(&conn, id)
    }

    async fn close_session(&self, id: &str, ended_at: &str) -> Result<String> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE replay_sessions SET ended_at = ? WHERE id = ? AND ended_at IS NULL",
            duckdb::params![ended_at, id],
        )?;
        let session = query_session(&conn, id)?
            .ok_or_else(|| Error::NotFound(format!("session {id} not found")))?;
        session
            .ended_at
            .ok_or_else(|| Error::Persistence(format!("session {id} did not close")))
    }

    async fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.user_id, s.started_at, s.ended_at, COUNT(a.seq) AS action_count \
             FROM replay_sessions s LEFT JOIN replay_actions a ON a.session_id = s.id \
             GROUP BY s.id, s.user_id, s.started_at, s.ended_at \
             ORDER BY s.started_at DESC, s.id DESC LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(duckdb::params![limit as i64, offset as i64], |row| {
            Ok(SessionSummary {
                id: row.get(0)?,
                user_id: row.get(1)?,
                started_at: row.get(2)?,
                ended_at: row.get(3)?,
                action_count: row.get::<_, i64>(4)? as u64,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| Error::Persistence(e.to_string()))?);
        }
        Ok(results)
    }

    async fn append_actions(&self, session_id: &str, actions: &[ReplayAction]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let session = query_session(&conn, session_id)?.ok_or_else(|| {
            Error::Persistence(format!("session {session_id} does not exist"))
        })?;
        if session.is_closed() {
            return Err(Error::Validation(format!("session {session_id} is closed")));
        }
        if actions.is_empty() {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        let last_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), -1) FROM replay_actions WHERE session_id = ?",
            [session_id],
            |row| row.get(0),
        )?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO replay_actions (session_id, seq, t, ts, d) VALUES (?, ?, ?, ?, ?)")?;
            for (i, action) in actions.iter().enumerate() {
                action.validate()?;
                let data_json = serde_json::to_string(&action.data)?;
                stmt.execute(duckdb::params![
                    session_id,
                    last_seq + 1 + i as i64,
                    action.kind,
                    action.timestamp as i64,
                    data_json,
                ])?;
            }
        }
        tx.commit()?;
        Ok(actions.len())
    }

    async fn get_session_actions(&self, session_id: &str) -> Result<Vec<ReplayAction>> {
        let conn = self.conn.lock().await;
        if query_session(&conn, session_id)?.is_none() {
            return Err(Error::NotFound(format!("session {session_id} not found")));
        }
        let mut stmt = conn.prepare(
            "SELECT t, ts, d FROM replay_actions WHERE session_id = ? ORDER BY ts ASC, seq ASC",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut results = Vec::new();
        for row in rows {
            let (kind, ts, data) = row.map_err(|e| Error::Persistence(e.to_string()))?;
            results.push(to_action(kind, ts, data)?);
        }
        Ok(results)
    }
}
