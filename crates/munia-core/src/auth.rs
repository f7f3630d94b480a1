//! Caller identity as seen by the replay pipeline.
//!
//! Authentication itself belongs to the host application; this module only
//! turns a bearer credential into a [`Caller`] and answers role questions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            _ => Err(crate::error::Error::Validation(format!("invalid role: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Require an administrator. Anonymous and non-admin callers get the same
/// error so the response never depends on anything but the caller.
pub fn require_admin(caller: Option<&Caller>) -> Result<&Caller> {
    match caller {
        Some(c) if c.is_admin() => Ok(c),
        _ => Err(Error::Forbidden("administrator role required".to_string())),
    }
}

/// Require any signed-in user.
pub fn require_user(caller: Option<&Caller>) -> Result<&Caller> {
    caller.ok_or_else(|| Error::Forbidden("sign-in required".to_string()))
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token. `Ok(None)` means "no such identity".
    async fn resolve(&self, token: &str) -> Result<Option<Caller>>;
}

/// Fixed token table, parsed from `token=user:role[,token=user:role...]`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Caller>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, caller: Caller) -> Self {
        self.tokens.insert(token.into(), caller);
        self
    }

    pub fn parse(spec: &str) -> Result<Self> {
        let mut provider = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, identity) = entry
                .split_once('=')
                .ok_or_else(|| Error::Validation(format!("token entry '{entry}' lacks '='")))?;
            let (user, role) = identity.split_once(':').unwrap_or((identity, "member"));
            if token.is_empty() || user.is_empty() {
                return Err(Error::Validation(format!(
                    "token entry '{entry}' has an empty token or user"
                )));
            }
            provider
                .tokens
                .insert(token.to_string(), Caller::new(user, role.parse()?));
        }
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn resolve(&self, token: &str) -> Result<Option<Caller>> {
        Ok(self.tokens.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_spec() {
        let provider = StaticTokenProvider::parse("t1=alice:admin, t2=bob:member,t3=carol").unwrap();
        assert_eq!(provider.len(), 3);
        assert_eq!(provider.tokens["t1"], Caller::new("alice", Role::Admin));
        assert_eq!(provider.tokens["t3"].role, Role::Member);
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert!(StaticTokenProvider::parse("no-equals").is_err());
        assert!(StaticTokenProvider::parse("t1=alice:root").is_err());
        assert!(StaticTokenProvider::parse("=alice:admin").is_err());
        assert!(StaticTokenProvider::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_require_admin_same_error_for_anonymous_and_member() {
        let member = Caller::new("bob", Role::Member);
        let a = require_admin(None).unwrap_err().to_string();
        let b = require_admin(Some(&member)).unwrap_err().to_string();
        assert_eq!(a, b);
        let admin = Caller::new("alice", Role::Admin);
        assert!(require_admin(Some(&admin)).is_ok());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[tokio::test]
    async fn test_resolve_unknown_token() {
        let provider = StaticTokenProvider::new().with_token("t", Caller::new("a", Role::Member));
        assert!(provider.resolve("t").await.unwrap().is_some());
        assert!(provider.resolve("x").await.unwrap().is_none());
    }
}
