//! Progress reporting hooks

use super::model::Session;
use crate::humanize::ByteSize;
use std::time::Duration;
use tracing::info;

/// Point-in-time view of an active session
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub name: String,
    pub percent: f64,
    pub completed_bytes: u64,
    pub total_bytes: u64,
    pub download_speed: u64,
    pub eta: Duration,
}

impl ProgressReport {
    pub fn from_session(session: &Session) -> Self {
        Self {
            name: session.display_name.clone(),
            percent: session.percent(),
            completed_bytes: session.completed_bytes,
            total_bytes: session.total_bytes,
            download_speed: session.download_speed,
            eta: session.eta(),
        }
    }
}

/// Receives throttled progress updates from the session monitor
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, report: &ProgressReport);
}

/// Emits progress as structured log events
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, report: &ProgressReport) {
        info!(
            name = %report.name,
            percent = %format!("{:.1}", report.percent),
            rate = %format!("{}/s", ByteSize(report.download_speed)),
            eta_secs = report.eta.as_secs(),
            "Download progress"
        );
    }
}
