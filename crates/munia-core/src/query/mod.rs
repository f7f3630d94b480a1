pub mod ingest;
pub mod retrieval;

use std::sync::Arc;

use crate::auth::{Caller, IdentityProvider};
use crate::error::Result;
use crate::storage::ReplayStorage;

/// Largest page the session index returns.
pub const DEFAULT_INDEX_LIMIT: usize = 1000;

pub struct ReplayEngine {
    pub storage: Arc<dyn ReplayStorage>,
    pub identity: Arc<dyn IdentityProvider>,
    pub index_limit: usize,
}

impl ReplayEngine {
    pub fn new(storage: Arc<dyn ReplayStorage>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            storage,
            identity,
            index_limit: DEFAULT_INDEX_LIMIT,
        }
    }

    pub fn with_index_limit(mut self, limit: usize) -> Self {
        self.index_limit = limit;
        self
    }

    /// Resolve an optional bearer token. Unknown tokens resolve to `None`,
    /// the same as no token at all.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Option<Caller>> {
        match token {
            Some(t) if !t.is_empty() => self.identity.resolve(t).await,
            _ => Ok(None),
        }
    }

    pub async fn record(
        &self,
        caller: Option<&Caller>,
        request: ingest::IngestRequest,
    ) -> Result<ingest::IngestResponse> {
        ingest::execute(self, caller, request).await
    }

    pub async fn close_session(
        &self,
        caller: Option<&Caller>,
        session_id: &str,
    ) -> Result<ingest::CloseResponse> {
        ingest::close(self, caller, session_id).await
    }

    pub async fn list_sessions(
        &self,
        caller: Option<&Caller>,
        page: retrieval::SessionPage,
    ) -> Result<retrieval::SessionIndex> {
        retrieval::list_sessions(self, caller, page).await
    }

    pub async fn session_actions(
        &self,
        caller: Option<&Caller>,
        session_id: &str,
    ) -> Result<retrieval::SessionActions> {
        retrieval::session_actions(self, caller, session_id).await
    }
}
