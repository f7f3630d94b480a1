//! The "is replaying" flag shared by the recorder and the replay controller.
//!
//! [`replay_context`] hands out a cloneable read-only [`ReplayStatus`] and a
//! single [`ReplaySwitch`]. Only the holder of the switch can raise the flag,
//! and only for the lifetime of a [`ReplayingGuard`], which lowers it again
//! on drop (normal completion, early return, cancellation or panic alike).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn replay_context() -> (ReplayStatus, ReplaySwitch) {
    let flag = Arc::new(AtomicBool::new(false));
    (
        ReplayStatus { flag: flag.clone() },
        ReplaySwitch { flag },
    )
}

#[derive(Debug, Clone)]
pub struct ReplayStatus {
    flag: Arc<AtomicBool>,
}

impl ReplayStatus {
    pub fn is_replaying(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Write capability for the flag. Deliberately not `Clone`.
#[derive(Debug)]
pub struct ReplaySwitch {
    flag: Arc<AtomicBool>,
}

impl ReplaySwitch {
    pub fn status(&self) -> ReplayStatus {
        ReplayStatus {
            flag: self.flag.clone(),
        }
    }

    /// Raise the flag until the returned guard is dropped.
    pub fn engage(&mut self) -> ReplayingGuard<'_> {
        self.flag.store(true, Ordering::Release);
        ReplayingGuard { flag: &self.flag }
    }
}

#[derive(Debug)]
pub struct ReplayingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ReplayingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_raises_and_lowers_flag() {
        let (status, mut switch) = replay_context();
        assert!(!status.is_replaying());
        {
            let _guard = switch.engage();
            assert!(status.is_replaying());
            assert!(status.clone().is_replaying());
        }
        assert!(!status.is_replaying());
    }

    #[test]
    fn test_flag_lowered_on_panic() {
        let (status, mut switch) = replay_context();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = switch.engage();
            panic!("target blew up");
        }));
        assert!(result.is_err());
        assert!(!status.is_replaying());
    }

    #[test]
    fn test_switch_status_shares_flag() {
        let (status, mut switch) = replay_context();
        let derived = switch.status();
        let guard = switch.engage();
        assert!(derived.is_replaying());
        drop(guard);
        assert!(!status.is_replaying());
    }
}
