//! Polling loop that reconciles engine state into a [`Session`]

use super::model::{Session, SessionFailure};
use super::observer::{ProgressObserver, ProgressReport};
use crate::config::SessionConfig;
use crate::rpc::{ControlChannel, EngineFile, JobHandle, RemoteStatus, StatusSnapshot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STATUS_KEYS: &[&str] = &[
    "status",
    "completedLength",
    "totalLength",
    "downloadSpeed",
    "files",
    "errorMessage",
];

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    /// Wall-clock ceiling from session start, independent of progress
    pub timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            progress_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

impl From<&SessionConfig> for MonitorSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            progress_interval: Duration::from_millis(config.progress_interval_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

pub struct SessionMonitor {
    channel: Arc<dyn ControlChannel>,
    observer: Arc<dyn ProgressObserver>,
    settings: MonitorSettings,
}

impl SessionMonitor {
    pub fn new(
        channel: Arc<dyn ControlChannel>,
        observer: Arc<dyn ProgressObserver>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            channel,
            observer,
            settings,
        }
    }

    /// Poll `handle` until it completes, fails, times out or `cancel` fires.
    ///
    /// The returned session is always in a terminal state. Only a completed session carries
    /// artifacts.
    pub async fn run(
        &self,
        handle: JobHandle,
        display_name: &str,
        cancel: &CancellationToken,
    ) -> Session {
        let mut session = Session::new(handle, display_name);
        let started = Instant::now();
        let mut last_report = started;

        info!(gid = %session.handle, name = %session.display_name, "Monitoring download");

        loop {
            if cancel.is_cancelled() {
                self.cancel(&mut session).await;
                break;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.settings.timeout {
                session.fail(SessionFailure::TimedOut(self.settings.timeout));
                warn!(
                    gid = %session.handle,
                    elapsed_secs = elapsed.as_secs(),
                    "Download timed out"
                );
                break;
            }

            match self.channel.tell_status(&session.handle, STATUS_KEYS).await {
                Ok(snapshot) => self.reconcile(&mut session, &snapshot).await,
                Err(e) => {
                    debug!(gid = %session.handle, error = %e, "Status query failed");
                }
            }

            if session.state().is_terminal() {
                break;
            }

            if session.total_bytes > 0 && last_report.elapsed() >= self.settings.progress_interval {
                self.observer.on_progress(&ProgressReport::from_session(&session));
                last_report = Instant::now();
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        session
    }

    async fn reconcile(&self, session: &mut Session, snapshot: &StatusSnapshot) {
        session.record(snapshot);

        match snapshot.status {
            RemoteStatus::Complete => {
                let artifacts = existing_paths(&snapshot.files).await;
                if session.complete(artifacts).is_some() {
                    info!(
                        gid = %session.handle,
                        name = %session.display_name,
                        artifacts = session.artifacts().len(),
                        "Download completed"
                    );
                }
            }
            RemoteStatus::Error => {
                let failure = SessionFailure::RemoteError(snapshot.error_message.clone());
                warn!(gid = %session.handle, reason = %failure, "Download failed");
                session.fail(failure);
            }
            RemoteStatus::Removed => {
                warn!(gid = %session.handle, "Download removed");
                session.fail(SessionFailure::Removed);
            }
            _ => {}
        }
    }

    async fn cancel(&self, session: &mut Session) {
        if session.state().is_terminal() {
            return;
        }
        if let Err(e) = self.channel.remove(&session.handle).await {
            warn!(gid = %session.handle, error = %e, "Failed to remove cancelled job");
        }
        session.fail(SessionFailure::Cancelled);
        info!(gid = %session.handle, "Download cancelled");
    }
}

/// Paths the engine reported that actually exist on disk, in engine order
async fn existing_paths(files: &[EngineFile]) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(files.len());
    for file in files {
        if file.path.is_empty() {
            continue;
        }
        let path = PathBuf::from(&file.path);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            paths.push(path);
        } else {
            debug!(path = %path.display(), "Reported file missing on disk, skipping");
        }
    }
    paths
}
