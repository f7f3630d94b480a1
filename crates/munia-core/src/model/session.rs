use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MAX_SESSION_ID_LEN: usize = 128;

/// One continuous recording interval tied to a single browser context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplaySession {
    pub id: String,
    pub user_id: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl ReplaySession {
    pub fn new(id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            user_id,
            started_at: super::now_timestamp(),
            ended_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Index row: a session without its payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub user_id: Option<String>,
    pub action_count: u64,
    pub started_at: String,
    pub ended_at: Option<String>,
}

/// Session ids are opaque, but they travel unescaped in URL paths.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Validation("session id must not be empty".to_string()));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(Error::Validation(format!(
            "session id exceeds {MAX_SESSION_ID_LEN} bytes"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::Validation(
            "session id may only contain ASCII letters, digits, '-', '_' and '.'".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_open() {
        let session = ReplaySession::new("s1", Some("alice".to_string()));
        assert_eq!(session.id, "s1");
        assert!(!session.is_closed());
        assert!(session.started_at.ends_with('Z'));
    }

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("0192f0c1-7a5e-7000-8000-000000000000").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id("line\nbreak").is_err());
        assert!(validate_session_id("s1?x=1").is_err());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }
}
