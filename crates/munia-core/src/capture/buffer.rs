//! In-memory batching of captured actions.
//!
//! The buffer flushes when it holds `flush_every` actions or when the
//! background flusher finds `flush_interval` elapsed since the last flush,
//! whichever comes first. Delivery is best effort: a batch that still fails
//! after `max_flush_retries` retries is dropped and logged. Errors that a
//! retry cannot fix (closed or foreign session) drop the batch at once.
//!
//! Once a flusher task is running, a full buffer hands its flush to that
//! task so `append` never waits on the sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::capture::sink::ActionSink;
use crate::config::ReplayConfig;
use crate::model::action::ReplayAction;

struct Pending {
    entries: Vec<ReplayAction>,
    last_flush_at: Instant,
}

pub struct CommandBuffer {
    sink: Arc<dyn ActionSink>,
    session_id: OnceLock<String>,
    pending: Mutex<Pending>,
    // Held across drain and submit so batches reach the sink in drain order.
    flush_lock: tokio::sync::Mutex<()>,
    flush_requested: Notify,
    flusher_running: AtomicBool,
    closed: AtomicBool,
    flush_every: usize,
    flush_interval: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl CommandBuffer {
    pub fn new(sink: Arc<dyn ActionSink>, config: &ReplayConfig) -> Self {
        Self {
            sink,
            session_id: OnceLock::new(),
            pending: Mutex::new(Pending {
                entries: Vec::new(),
                last_flush_at: Instant::now(),
            }),
            flush_lock: tokio::sync::Mutex::new(()),
            flush_requested: Notify::new(),
            flusher_running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            flush_every: config.flush_every.max(1),
            flush_interval: config.flush_interval,
            max_retries: config.max_flush_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    /// Continue a session whose id is already known (e.g. restored from a
    /// cookie) instead of minting a new one.
    pub fn for_session(
        sink: Arc<dyn ActionSink>,
        config: &ReplayConfig,
        session_id: impl Into<String>,
    ) -> Self {
        let buffer = Self::new(sink, config);
        let _ = buffer.session_id.set(session_id.into());
        buffer
    }

    /// Establish the session for this buffer. Idempotent: every call returns
    /// the id chosen by the first one.
    pub fn init(&self) -> &str {
        self.session_id.get_or_init(|| Uuid::now_v7().to_string())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock_pending().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when there is something to flush and the interval has elapsed.
    pub fn is_due(&self) -> bool {
        let pending = self.lock_pending();
        !pending.entries.is_empty() && pending.last_flush_at.elapsed() >= self.flush_interval
    }

    /// True after [`close`](Self::close); a closed buffer accepts nothing.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Add one action to the tail, flushing when the count threshold is hit.
    /// Returns `false` when the buffer is closed and the action was dropped.
    pub async fn append(&self, action: ReplayAction) -> bool {
        if self.is_closed() {
            tracing::debug!(session_id = ?self.session_id(), "replay buffer closed, dropping action");
            return false;
        }
        self.init();
        let full = {
            let mut pending = self.lock_pending();
            pending.entries.push(action);
            pending.entries.len() >= self.flush_every
        };
        if full {
            if self.flusher_running.load(Ordering::Acquire) {
                self.flush_requested.notify_one();
            } else {
                self.flush().await;
            }
        }
        true
    }

    /// Drain the buffer and hand the batch to the sink. Returns how many
    /// actions were delivered; failures are logged, never returned.
    pub async fn flush(&self) -> usize {
        let _serial = self.flush_lock.lock().await;
        let batch = {
            let mut pending = self.lock_pending();
            pending.last_flush_at = Instant::now();
            std::mem::take(&mut pending.entries)
        };
        if batch.is_empty() {
            return 0;
        }

        let session_id = self.init();
        let mut attempt: u32 = 0;
        loop {
            match self.sink.submit(session_id, &batch).await {
                Ok(()) => {
                    tracing::debug!(session_id, count = batch.len(), "flushed replay actions");
                    return batch.len();
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(error = %e, session_id, attempt, "replay flush failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        session_id,
                        dropped = batch.len(),
                        "dropping replay actions after failed flush"
                    );
                    return 0;
                }
            }
        }
    }

    /// Final flush, then mark the session closed on the sink. Later appends
    /// are dropped.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.flush().await;
        let Some(session_id) = self.session_id() else {
            return;
        };
        if let Err(e) = self.sink.close(session_id).await {
            tracing::warn!(error = %e, session_id, "failed to close replay session");
        }
    }

    /// Run the time-based trigger until `shutdown` turns true, then flush
    /// whatever is left.
    pub fn spawn_flusher(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let buffer = self.clone();
        buffer.flusher_running.store(true, Ordering::Release);
        tokio::spawn(async move {
            let period = buffer.flush_interval.max(Duration::from_millis(10));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if buffer.is_due() {
                            buffer.flush().await;
                        }
                    }
                    _ = buffer.flush_requested.notified() => {
                        buffer.flush().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            buffer.flusher_running.store(false, Ordering::Release);
                            buffer.flush().await;
                            return;
                        }
                    }
                }
            }
        })
    }
}
