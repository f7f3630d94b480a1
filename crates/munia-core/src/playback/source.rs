//! Where the controller fetches a recorded log from.

use std::sync::Arc;

use reqwest::StatusCode;

use crate::auth::Caller;
use crate::error::{Error, Result};
use crate::model::action::ReplayAction;
use crate::model::session::validate_session_id;
use crate::query::retrieval::{SessionActions, SessionIndex, SessionPage};
use crate::query::ReplayEngine;

#[async_trait::async_trait]
pub trait ActionSource: Send + Sync {
    async fn fetch(&self, session_id: &str) -> Result<Vec<ReplayAction>>;
}

/// Reads through the engine in-process, subject to the same admin check.
pub struct EngineSource {
    engine: Arc<ReplayEngine>,
    caller: Option<Caller>,
}

impl EngineSource {
    pub fn new(engine: Arc<ReplayEngine>, caller: Option<Caller>) -> Self {
        Self { engine, caller }
    }
}

#[async_trait::async_trait]
impl ActionSource for EngineSource {
    async fn fetch(&self, session_id: &str) -> Result<Vec<ReplayAction>> {
        let log = self
            .engine
            .session_actions(self.caller.as_ref(), session_id)
            .await?;
        Ok(log.actions)
    }
}

/// Client for the admin retrieval endpoints.
pub struct HttpActionSource {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpActionSource {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "failed to build HTTP client with timeouts, using default");
                    reqwest::Client::default()
                }),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(Error::Forbidden(format!("GET {url} was refused")))
            }
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("GET {url} returned 404"))),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Transport(format!("GET {url} returned {status}: {body}")))
            }
            _ => Ok(response.json().await?),
        }
    }

    pub async fn list_sessions(&self, page: SessionPage) -> Result<SessionIndex> {
        let mut url = format!("{}/admin/api/replay/sessions", self.base_url);
        let params: Vec<String> = [("limit", page.limit), ("offset", page.offset)]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| format!("{name}={v}")))
            .collect();
        if !params.is_empty() {
            url = format!("{url}?{}", params.join("&"));
        }
        self.get(url).await
    }
}

#[async_trait::async_trait]
impl ActionSource for HttpActionSource {
    async fn fetch(&self, session_id: &str) -> Result<Vec<ReplayAction>> {
        validate_session_id(session_id)?;
        let log: SessionActions = self
            .get(format!(
                "{}/admin/api/replay/sessions/{session_id}",
                self.base_url
            ))
            .await?;
        Ok(log.actions)
    }
}
