//! Persistence boundary consumed by the [`CommandBuffer`](super::CommandBuffer).

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Serialize;

use crate::auth::Caller;
use crate::error::{Error, Result};
use crate::model::action::ReplayAction;
use crate::query::ingest::IngestRequest;
use crate::query::ReplayEngine;

#[async_trait::async_trait]
pub trait ActionSink: Send + Sync {
    async fn submit(&self, session_id: &str, actions: &[ReplayAction]) -> Result<()>;
    async fn close(&self, session_id: &str) -> Result<()>;
}

/// In-process sink that writes through the engine as `caller`.
pub struct StorageSink {
    engine: Arc<ReplayEngine>,
    caller: Caller,
}

impl StorageSink {
    pub fn new(engine: Arc<ReplayEngine>, caller: Caller) -> Self {
        Self { engine, caller }
    }
}

#[async_trait::async_trait]
impl ActionSink for StorageSink {
    async fn submit(&self, session_id: &str, actions: &[ReplayAction]) -> Result<()> {
        self.engine
            .record(
                Some(&self.caller),
                IngestRequest {
                    session_id: session_id.to_string(),
                    actions: actions.to_vec(),
                },
            )
            .await?;
        Ok(())
    }

    async fn close(&self, session_id: &str) -> Result<()> {
        self.engine
            .close_session(Some(&self.caller), session_id)
            .await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ActionBatch<'a> {
    actions: &'a [ReplayAction],
}

/// Posts batches to the ingest endpoint of a running server.
pub struct HttpActionSink {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpActionSink {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .connect_timeout(std::time::Duration::from_secs(5))
                .build()
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "failed to build HTTP client with timeouts, using default");
                    reqwest::Client::default()
                }),
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, url: String, body: &B) -> Result<()> {
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        match response.status() {
            StatusCode::BAD_REQUEST => Err(Error::Validation(format!("POST {url} was rejected"))),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(Error::Forbidden(format!("POST {url} was refused")))
            }
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("POST {url} returned 404"))),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Transport(format!("POST {url} returned {status}: {body}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ActionSink for HttpActionSink {
    async fn submit(&self, session_id: &str, actions: &[ReplayAction]) -> Result<()> {
        let url = format!("{}/v1/replay/sessions/{session_id}/actions", self.base_url);
        self.post(url, &ActionBatch { actions }).await
    }

    async fn close(&self, session_id: &str) -> Result<()> {
        let url = format!("{}/v1/replay/sessions/{session_id}/close", self.base_url);
        self.post(url, &serde_json::json!({})).await
    }
}
