pub const CREATE_REPLAY_SESSIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS replay_sessions (
    id VARCHAR PRIMARY KEY,
    user_id VARCHAR,
    started_at VARCHAR NOT NULL,
    ended_at VARCHAR
);
CREATE INDEX IF NOT EXISTS idx_replay_sessions_started_at ON replay_sessions(started_at);
CREATE INDEX IF NOT EXISTS idx_replay_sessions_user_id ON replay_sessions(user_id);
";

// NOTE: replay_actions is append-only. DuckDB lacks triggers, so this is
// enforced by the storage layer, which never issues UPDATE or DELETE here.
// seq is the per-session insertion counter that breaks timestamp ties.
pub const CREATE_REPLAY_ACTIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS replay_actions (
    session_id VARCHAR NOT NULL,
    seq BIGINT NOT NULL,
    t VARCHAR NOT NULL,
    ts BIGINT NOT NULL,
    d JSON,
    PRIMARY KEY (session_id, seq)
);
CREATE INDEX IF NOT EXISTS idx_replay_actions_session_ts ON replay_actions(session_id, ts);
";

pub fn run_migrations(conn: &duckdb::Connection) -> duckdb::Result<()> {
    conn.execute_batch(CREATE_REPLAY_SESSIONS_TABLE)?;
    conn.execute_batch(CREATE_REPLAY_ACTIONS_TABLE)?;
    Ok(())
}
