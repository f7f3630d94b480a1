use munia_core::error::{Error, Result};

/// Run all PostgreSQL schema migrations.
///
/// Mirrors the DuckDB schema: timestamps stay as fixed-width RFC 3339
/// strings so ordering by `started_at` behaves the same on both backends.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS replay_sessions (
    id VARCHAR PRIMARY KEY,
    user_id VARCHAR,
    started_at VARCHAR NOT NULL,
    ended_at VARCHAR
)
"#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Persistence(format!("create replay_sessions: {e}")))?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS replay_actions (
    session_id VARCHAR NOT NULL REFERENCES replay_sessions(id),
    seq BIGINT NOT NULL,
    t VARCHAR NOT NULL,
    ts BIGINT NOT NULL CHECK (ts >= 0),
    d JSONB,
    PRIMARY KEY (session_id, seq)
)
"#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Persistence(format!("create replay_actions: {e}")))?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_replay_sessions_started_at ON replay_sessions(started_at)",
        "CREATE INDEX IF NOT EXISTS idx_replay_sessions_user_id ON replay_sessions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_replay_actions_session_ts ON replay_actions(session_id, ts)",
    ] {
        sqlx::query(index)
            .execute(pool)
            .await
            .map_err(|e| Error::Persistence(format!("create index: {e}")))?;
    }

    Ok(())
}
