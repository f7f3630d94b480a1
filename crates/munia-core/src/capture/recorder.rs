//! Turns navigations and UI commands into [`ReplayAction`]s.
//!
//! An action is emitted only when recording is enabled, a user is signed in
//! and no replay is in progress. The last gate keeps the controller's own
//! replayed navigations out of the log. After [`Recorder::stop`] nothing is
//! emitted at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::capture::buffer::CommandBuffer;
use crate::capture::context::ReplayStatus;
use crate::config::ReplayConfig;
use crate::model::action::{ActionPayload, ReplayAction};

pub fn now_millis() -> u64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub struct Recorder {
    enabled: bool,
    identity: RwLock<Option<String>>,
    status: ReplayStatus,
    buffer: Arc<CommandBuffer>,
    last_ts: AtomicU64,
    clock: Clock,
}

impl Recorder {
    pub fn new(config: &ReplayConfig, status: ReplayStatus, buffer: Arc<CommandBuffer>) -> Self {
        Self {
            enabled: config.enabled,
            identity: RwLock::new(None),
            status,
            buffer,
            last_ts: AtomicU64::new(0),
            clock: Arc::new(now_millis),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn set_identity(&self, user_id: Option<String>) {
        *self.identity.write().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    pub fn identity(&self) -> Option<String> {
        self.identity.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn buffer(&self) -> &Arc<CommandBuffer> {
        &self.buffer
    }

    /// All gates at once, plus the session still being open.
    pub fn is_active(&self) -> bool {
        self.enabled
            && !self.buffer.is_closed()
            && self.identity().is_some()
            && !self.status.is_replaying()
    }

    /// Current time, clamped so it never goes below a previously issued one.
    fn next_timestamp(&self) -> u64 {
        let now = (self.clock)();
        let previous = self.last_ts.fetch_max(now, Ordering::AcqRel);
        previous.max(now)
    }

    /// Record one action if the gates allow it. Returns whether it was buffered.
    pub async fn record(&self, payload: ActionPayload) -> bool {
        if !self.is_active() {
            return false;
        }
        let action = match ReplayAction::new(self.next_timestamp(), &payload) {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(error = %e, kind = %payload.kind(), "discarding unrecordable action");
                return false;
            }
        };
        self.buffer.append(action).await
    }

    pub async fn route_changed(&self, path: &str) -> bool {
        self.record(ActionPayload::route(path)).await
    }

    pub async fn command(&self, name: &str, args: Value) -> bool {
        self.record(ActionPayload::command(name, args)).await
    }

    pub async fn click(&self, target: &str) -> bool {
        self.record(ActionPayload::click(target)).await
    }

    pub async fn submit(&self, form: &str, values: Map<String, Value>) -> bool {
        self.record(ActionPayload::submit(form, values)).await
    }

    /// End the recording: flush and close the session. The recorder stays
    /// inactive afterwards.
    pub async fn stop(&self) {
        self.buffer.close().await;
    }

    /// Sign-out ends the session; later actions are not recorded.
    pub async fn logout(&self) {
        self.set_identity(None);
        self.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::context::replay_context;
    use crate::capture::sink::ActionSink;
    use crate::config::ReplayConfig;
    use crate::error::Result;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        actions: Mutex<Vec<ReplayAction>>,
        closed: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl ActionSink for MemorySink {
        async fn submit(&self, _session_id: &str, actions: &[ReplayAction]) -> Result<()> {
            self.actions.lock().unwrap().extend_from_slice(actions);
            Ok(())
        }

        async fn close(&self, _session_id: &str) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn setup(enabled: bool) -> (Recorder, Arc<MemorySink>, crate::capture::ReplaySwitch) {
        let sink = Arc::new(MemorySink::default());
        let buffer = Arc::new(CommandBuffer::new(sink.clone(), &ReplayConfig::default()));
        let (status, switch) = replay_context();
        let config = ReplayConfig {
            enabled,
            ..Default::default()
        };
        let recorder = Recorder::new(&config, status, buffer);
        recorder.set_identity(Some("alice".to_string()));
        (recorder, sink, switch)
    }

    #[tokio::test]
    async fn test_route_change_recorded() {
        let (recorder, sink, _switch) = setup(true);
        let recorder = recorder.with_clock(|| 1000);
        assert!(recorder.route_changed("/feed").await);
        recorder.buffer().flush().await;

        let actions = sink.actions.lock().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, "route");
        assert_eq!(actions[0].timestamp, 1000);
        assert_eq!(actions[0].data, serde_json::json!({"path": "/feed"}));
    }

    #[tokio::test]
    async fn test_disabled_records_nothing() {
        let (recorder, _sink, _switch) = setup(false);
        assert!(!recorder.route_changed("/feed").await);
        assert!(recorder.buffer().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_records_nothing() {
        let (recorder, _sink, _switch) = setup(true);
        recorder.set_identity(None);
        assert!(!recorder.click("#like").await);
        assert!(recorder.buffer().is_empty());
    }

    #[tokio::test]
    async fn test_replaying_records_nothing() {
        let (recorder, _sink, mut switch) = setup(true);
        {
            let _guard = switch.engage();
            assert!(!recorder.route_changed("/posts/3").await);
            assert!(!recorder.command("like-post", serde_json::json!({"postId": 3})).await);
        }
        assert!(recorder.buffer().is_empty());
        assert!(recorder.route_changed("/posts/3").await);
        assert_eq!(recorder.buffer().len(), 1);
    }

    #[tokio::test]
    async fn test_timestamps_never_decrease() {
        let ticks = Arc::new(Mutex::new(vec![300u64, 100, 500].into_iter()));
        let (recorder, sink, _switch) = setup(true);
        let recorder = recorder.with_clock(move || ticks.lock().unwrap().next().unwrap_or(0));
        for path in ["/a", "/b", "/c"] {
            recorder.route_changed(path).await;
        }
        recorder.buffer().flush().await;
        let ts: Vec<_> = sink.actions.lock().unwrap().iter().map(|a| a.timestamp).collect();
        assert_eq!(ts, vec![300, 300, 500]);
    }

    #[tokio::test]
    async fn test_nothing_recorded_after_stop() {
        let (recorder, sink, _switch) = setup(true);
        assert!(recorder.route_changed("/feed").await);
        recorder.stop().await;

        assert!(!recorder.is_active());
        assert!(!recorder.route_changed("/after-stop").await);
        assert_eq!(recorder.buffer().flush().await, 0);
        let paths: Vec<_> = sink.actions.lock().unwrap().iter().map(|a| a.data["path"].clone()).collect();
        assert_eq!(paths, vec![serde_json::json!("/feed")]);
    }

    #[tokio::test]
    async fn test_logout_closes_session_and_stops_recording() {
        let (recorder, sink, _switch) = setup(true);
        recorder.submit("new-post", Map::new()).await;
        recorder.logout().await;
        assert!(*sink.closed.lock().unwrap());
        assert_eq!(sink.actions.lock().unwrap().len(), 1);
        assert!(!recorder.route_changed("/feed").await);
    }
}
