//! Replays a recorded log against a [`ReplayTarget`].
//!
//! ```text
//! Idle -> Loading -> Replaying -> Finished
//!            |           |-----> Aborted
//!            +-----------+-----> Error
//! ```
//!
//! Terminal states accept a new [`ReplayController::run`], which starts
//! over at `Loading`. The replay flag is raised only between loading and
//! the end of the last applied action.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::capture::context::ReplaySwitch;
use crate::config::{ReplayConfig, ReplayPacing};
use crate::model::action::ActionPayload;
use crate::playback::source::ActionSource;
use crate::playback::target::ReplayTarget;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplayState {
    Idle,
    Loading {
        session_id: String,
    },
    Replaying {
        session_id: String,
        applied: usize,
        total: usize,
    },
    Finished {
        session_id: String,
        applied: usize,
    },
    Aborted {
        session_id: String,
        applied: usize,
        total: usize,
    },
    Error {
        session_id: String,
        reason: String,
    },
}

impl ReplayState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReplayState::Finished { .. } | ReplayState::Aborted { .. } | ReplayState::Error { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReplayState::Idle => "idle",
            ReplayState::Loading { .. } => "loading",
            ReplayState::Replaying { .. } => "replaying",
            ReplayState::Finished { .. } => "finished",
            ReplayState::Aborted { .. } => "aborted",
            ReplayState::Error { .. } => "error",
        }
    }
}

/// Operator side of an abort request.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Controller side of an abort request. A signal whose handles are all
/// dropped never fires.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn never() -> Self {
        abort_pair().1
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

enum Outcome {
    Completed,
    Aborted(usize),
    Failed(usize, String),
}

pub struct ReplayController {
    source: Arc<dyn ActionSource>,
    target: Arc<dyn ReplayTarget>,
    switch: ReplaySwitch,
    pacing: ReplayPacing,
    fetch_timeout: Duration,
    state: watch::Sender<ReplayState>,
}

impl ReplayController {
    pub fn new(
        source: Arc<dyn ActionSource>,
        target: Arc<dyn ReplayTarget>,
        switch: ReplaySwitch,
        config: &ReplayConfig,
    ) -> Self {
        let (state, _) = watch::channel(ReplayState::Idle);
        Self {
            source,
            target,
            switch,
            pacing: config.pacing,
            fetch_timeout: config.fetch_timeout,
            state,
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state.borrow().clone()
    }

    /// Observe state transitions, e.g. to drive a progress display.
    pub fn subscribe(&self) -> watch::Receiver<ReplayState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ReplayState) -> ReplayState {
        tracing::debug!(state = next.name(), "replay state");
        self.state.send_replace(next.clone());
        next
    }

    fn fail(&self, session_id: &str, reason: String) -> ReplayState {
        tracing::warn!(session_id, reason = %reason, "replay failed");
        self.transition(ReplayState::Error {
            session_id: session_id.to_string(),
            reason,
        })
    }

    /// Load `session_id` and replay it to the end, until `abort` fires, or
    /// until something fails. Returns the terminal state.
    pub async fn run(&mut self, session_id: &str, mut abort: AbortSignal) -> ReplayState {
        self.transition(ReplayState::Loading {
            session_id: session_id.to_string(),
        });

        let fetched = tokio::time::timeout(self.fetch_timeout, self.source.fetch(session_id)).await;
        let mut actions = match fetched {
            Err(_) => {
                return self.fail(
                    session_id,
                    format!("fetch timed out after {:?}", self.fetch_timeout),
                );
            }
            Ok(Err(e)) => return self.fail(session_id, e.to_string()),
            Ok(Ok(actions)) => actions,
        };
        if actions.is_empty() {
            return self.fail(session_id, "session has no recorded actions".to_string());
        }
        // Stable, so equal timestamps keep their stored order.
        actions.sort_by_key(|a| a.timestamp);

        let mut steps = Vec::with_capacity(actions.len());
        for action in &actions {
            match action.payload() {
                Ok(payload) => steps.push((action.timestamp, payload)),
                Err(e) => return self.fail(session_id, e.to_string()),
            }
        }
        let total = steps.len();

        let outcome = {
            let _replaying = self.switch.engage();
            self.state.send_replace(ReplayState::Replaying {
                session_id: session_id.to_string(),
                applied: 0,
                total,
            });
            apply_steps(
                self.target.as_ref(),
                &self.state,
                self.pacing,
                session_id,
                &steps,
                &mut abort,
            )
            .await
        };

        match outcome {
            Outcome::Completed => {
                tracing::info!(session_id, applied = total, "replay finished");
                self.transition(ReplayState::Finished {
                    session_id: session_id.to_string(),
                    applied: total,
                })
            }
            Outcome::Aborted(applied) => {
                tracing::info!(session_id, applied, total, "replay aborted");
                self.transition(ReplayState::Aborted {
                    session_id: session_id.to_string(),
                    applied,
                    total,
                })
            }
            Outcome::Failed(applied, reason) => self.fail(
                session_id,
                format!("action {} of {total} failed: {reason}", applied + 1),
            ),
        }
    }
}

async fn apply_steps(
    target: &dyn ReplayTarget,
    state: &watch::Sender<ReplayState>,
    pacing: ReplayPacing,
    session_id: &str,
    steps: &[(u64, ActionPayload)],
    abort: &mut AbortSignal,
) -> Outcome {
    let mut previous_ts = steps.first().map(|(ts, _)| *ts).unwrap_or(0);
    for (applied, (ts, payload)) in steps.iter().enumerate() {
        let delay = pacing.delay(previous_ts, *ts);
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = abort.aborted() => return Outcome::Aborted(applied),
            }
        }
        if abort.is_aborted() {
            return Outcome::Aborted(applied);
        }

        let result = match payload {
            ActionPayload::Route(route) => target.navigate(&route.path).await,
            other => target.dispatch(other).await,
        };
        if let Err(e) = result {
            return Outcome::Failed(applied, e.to_string());
        }

        previous_ts = *ts;
        state.send_replace(ReplayState::Replaying {
            session_id: session_id.to_string(),
            applied: applied + 1,
            total: steps.len(),
        });
    }
    Outcome::Completed
}
