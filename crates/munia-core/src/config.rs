use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MuniaConfig {
    pub db_path: PathBuf,
    pub postgres_url: Option<String>,
    pub rest_port: u16,
    pub admin_enabled: bool,
    /// `token=user:role[,...]`, see [`crate::auth::StaticTokenProvider::parse`].
    pub api_tokens: Option<String>,
}

impl Default for MuniaConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("munia-replay.db"),
            postgres_url: None,
            rest_port: 8080,
            admin_enabled: true,
            api_tokens: None,
        }
    }
}

/// How the controller spaces replayed actions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayPacing {
    /// Recorded inter-arrival time divided by `speed`, never longer than `max_gap`.
    Recorded { speed: f64, max_gap: Duration },
    Fixed(Duration),
}

impl ReplayPacing {
    pub fn delay(&self, previous_ts: u64, ts: u64) -> Duration {
        match *self {
            ReplayPacing::Recorded { speed, max_gap } => {
                let gap = Duration::from_millis(ts.saturating_sub(previous_ts));
                let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
                gap.div_f64(speed).min(max_gap)
            }
            ReplayPacing::Fixed(d) => d,
        }
    }
}

impl Default for ReplayPacing {
    fn default() -> Self {
        ReplayPacing::Recorded {
            speed: 1.0,
            max_gap: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Resolved "replay enabled" flag; sampling rules live with the host.
    pub enabled: bool,
    pub flush_every: usize,
    pub flush_interval: Duration,
    pub max_flush_retries: u32,
    pub retry_backoff: Duration,
    pub fetch_timeout: Duration,
    pub pacing: ReplayPacing,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_every: 32,
            flush_interval: Duration::from_secs(5),
            max_flush_retries: 2,
            retry_backoff: Duration::from_millis(200),
            fetch_timeout: Duration::from_secs(10),
            pacing: ReplayPacing::default(),
        }
    }
}
