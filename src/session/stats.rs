//! Session counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic frame-path counters. Shared lock-free so the health log can
/// read them while an evaluation runs.
#[derive(Default)]
pub struct SessionStats {
    frames_seen: AtomicU64,
    frames_dropped: AtomicU64,
    evaluations: AtomicU64,
    eval_failures: AtomicU64,
    last_bind_us: AtomicU64,
    last_eval_us: AtomicU64,
}

impl SessionStats {
    pub(crate) fn record_seen(&self) {
        self.frames_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evaluation(&self, bind_us: u64, eval_us: u64) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.last_bind_us.store(bind_us, Ordering::Relaxed);
        self.last_eval_us.store(eval_us, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.eval_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_seen: self.frames_seen.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            eval_failures: self.eval_failures.load(Ordering::Relaxed),
            last_bind_us: self.last_bind_us.load(Ordering::Relaxed),
            last_eval_us: self.last_eval_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the session counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_seen: u64,
    pub frames_dropped: u64,
    pub evaluations: u64,
    pub eval_failures: u64,
    pub last_bind_us: u64,
    pub last_eval_us: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seen={} dropped={} evaluated={} failures={} bind={}us eval={}us",
            self.frames_seen,
            self.frames_dropped,
            self.evaluations,
            self.eval_failures,
            self.last_bind_us,
            self.last_eval_us
        )
    }
}
