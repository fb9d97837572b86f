//! In-process counters summarised at exit

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    sessions_submitted: AtomicU64,
    sessions_completed: AtomicU64,
    sessions_failed: AtomicU64,
    sessions_timed_out: AtomicU64,
    submissions_rejected: AtomicU64,
    artifacts_relocated: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_submitted(&self) {
        self.sessions_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "sessions_submitted", "Metric incremented");
    }

    pub fn session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "sessions_completed", "Metric incremented");
    }

    pub fn session_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "sessions_failed", "Metric incremented");
    }

    pub fn session_timed_out(&self) {
        self.sessions_timed_out.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "sessions_timed_out", "Metric incremented");
    }

    pub fn submission_rejected(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions_rejected", "Metric incremented");
    }

    pub fn artifacts_relocated(&self, count: u64) {
        self.artifacts_relocated.fetch_add(count, Ordering::Relaxed);
        tracing::debug!(counter = "artifacts_relocated", count, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_submitted: self.sessions_submitted.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            sessions_timed_out: self.sessions_timed_out.load(Ordering::Relaxed),
            submissions_rejected: self.submissions_rejected.load(Ordering::Relaxed),
            artifacts_relocated: self.artifacts_relocated.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sessions_submitted: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub sessions_timed_out: u64,
    pub submissions_rejected: u64,
    pub artifacts_relocated: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted={} completed={} failed={} timed_out={} rejected={} relocated={}",
            self.sessions_submitted,
            self.sessions_completed,
            self.sessions_failed,
            self.sessions_timed_out,
            self.submissions_rejected,
            self.artifacts_relocated
        )
    }
}
