//! End-to-end handling of one item: submit, monitor, post-process

use crate::config::Config;
use crate::observability::Metrics;
use crate::postprocess::PostProcessor;
use crate::rpc::ControlChannel;
use crate::session::{
    FileEntry, JobSubmitter, MonitorSettings, ProgressObserver, SelectionApplier, SelectionSet,
    SessionFailure, SessionMonitor, SessionState, SourceDescriptor, SubmitError,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Final outcome of one item. Every item yields exactly one.
#[derive(Debug)]
pub enum ItemStatus {
    /// Artifacts in their final location
    Completed { artifacts: Vec<PathBuf> },
    Failed(SessionFailure),
    TimedOut,
    /// Never reached the engine, or the engine refused it
    Rejected(SubmitError),
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Completed { artifacts } => {
                write!(f, "completed ({} file(s))", artifacts.len())
            }
            ItemStatus::Failed(failure) => write!(f, "failed: {failure}"),
            ItemStatus::TimedOut => f.write_str("timed out"),
            ItemStatus::Rejected(e) => write!(f, "rejected: {e}"),
        }
    }
}

#[derive(Debug)]
pub struct ItemReport {
    pub name: String,
    pub status: ItemStatus,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ItemStatus::Completed { .. })
    }
}

pub struct Pipeline {
    channel: Arc<dyn ControlChannel>,
    submitter: JobSubmitter,
    monitor: SessionMonitor,
    postprocessor: Option<PostProcessor>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(
        channel: Arc<dyn ControlChannel>,
        submitter: JobSubmitter,
        monitor: SessionMonitor,
        postprocessor: Option<PostProcessor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            channel,
            submitter,
            monitor,
            postprocessor,
            metrics,
        }
    }

    /// Wire every collaborator from configuration. Post-processing runs only when enabled in
    /// config and requested by the caller.
    pub fn from_config(
        config: &Config,
        channel: Arc<dyn ControlChannel>,
        observer: Arc<dyn ProgressObserver>,
        metrics: Arc<Metrics>,
        postprocess: bool,
    ) -> Self {
        let applier = SelectionApplier::from_config(channel.clone(), &config.session);
        let submitter = JobSubmitter::new(
            channel.clone(),
            applier,
            config.paths.download_dir.clone(),
            config.submit.clone(),
        );
        let monitor = SessionMonitor::new(
            channel.clone(),
            observer,
            MonitorSettings::from(&config.session),
        );
        let postprocessor = (postprocess && config.postprocess.enabled).then(|| {
            PostProcessor::from_config(&config.postprocess, config.paths.output_dir.clone())
        });

        Self::new(channel, submitter, monitor, postprocessor, metrics)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn run_item(
        &self,
        source: &SourceDescriptor,
        selection: &SelectionSet,
        cancel: &CancellationToken,
    ) -> ItemReport {
        let name = source.display_name();
        info!(name = %name, "Processing item");

        let handle = match self.submitter.submit(source, selection).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(name = %name, error = %e, "Submission rejected");
                self.metrics.submission_rejected();
                return ItemReport {
                    name,
                    status: ItemStatus::Rejected(e),
                };
            }
        };
        self.metrics.session_submitted();

        let session = self.monitor.run(handle, &name, cancel).await;
        let status = match session.state() {
            SessionState::Completed => {
                let artifacts = self.finish(session.into_artifacts()).await;
                if artifacts.is_empty() {
                    warn!(name = %name, "Engine reported completion without artifacts");
                    self.metrics.session_failed();
                    ItemStatus::Failed(SessionFailure::NoArtifacts)
                } else {
                    self.metrics.session_completed();
                    ItemStatus::Completed { artifacts }
                }
            }
            SessionState::TimedOut => {
                self.metrics.session_timed_out();
                ItemStatus::TimedOut
            }
            _ => {
                self.metrics.session_failed();
                let failure = session.failure().cloned().unwrap_or(SessionFailure::Removed);
                ItemStatus::Failed(failure)
            }
        };

        info!(name = %name, status = %status, "Item finished");
        ItemReport { name, status }
    }

    async fn finish(&self, artifacts: Vec<PathBuf>) -> Vec<PathBuf> {
        let Some(postprocessor) = &self.postprocessor else {
            return artifacts;
        };

        let report = postprocessor.process(&artifacts).await;
        self.metrics.artifacts_relocated(report.relocated_count() as u64);
        report
            .artifacts
            .into_iter()
            .flat_map(|artifact| std::iter::once(artifact.location).chain(artifact.subtitles))
            .collect()
    }

    /// Stage a torrent descriptor paused, read its file list, then drop the job.
    pub async fn inspect(&self, path: &Path) -> Result<Vec<FileEntry>, SubmitError> {
        let handle = self.submitter.stage_torrent_file(path).await?;
        let files = self.submitter.applier().wait_for_files(&handle).await;
        if let Err(e) = self.channel.remove(&handle).await {
            warn!(gid = %handle, error = %e, "Failed to remove inspected job");
        }
        Ok(files)
    }
}

/// Regular files in `dir` with their sizes, sorted by name
pub async fn list_output(dir: &Path) -> std::io::Result<Vec<(PathBuf, u64)>> {
    let mut entries = Vec::new();
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e),
    };

    while let Some(entry) = reader.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            entries.push((entry.path(), metadata.len()));
        }
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::ScriptedChannel;
    use crate::rpc::{ADD_URI, REMOVE, TELL_STATUS};
    use crate::session::LogObserver;
    use serde_json::json;
    use tempfile::TempDir;

    fn pipeline(channel: Arc<ScriptedChannel>, output: Option<&Path>) -> Pipeline {
        let mut config = Config::default();
        config.session.timeout_secs = 30;
        if let Some(output) = output {
            config.paths.output_dir = output.to_path_buf();
        }
        Pipeline::from_config(
            &config,
            channel,
            Arc::new(LogObserver),
            Arc::new(Metrics::new()),
            output.is_some(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_error_is_failed_item() {
        let channel = Arc::new(ScriptedChannel::new(|method, _| match method {
            ADD_URI => Ok(json!("gid1")),
            TELL_STATUS => Ok(json!({"status": "error", "errorMessage": "no peers"})),
            _ => Ok(json!("OK")),
        }));
        let pipeline = pipeline(channel, None);
        let source: SourceDescriptor = "magnet:?xt=urn:btih:abc".parse().unwrap();

        let report = pipeline
            .run_item(&source, &SelectionSet::default(), &CancellationToken::new())
            .await;

        assert!(!report.is_success());
        assert!(matches!(
            report.status,
            ItemStatus::Failed(SessionFailure::RemoteError(Some(ref m))) if m == "no peers"
        ));
        let metrics = pipeline.metrics().snapshot();
        assert_eq!(metrics.sessions_submitted, 1);
        assert_eq!(metrics.sessions_failed, 1);
    }

    #[tokio::test]
    async fn test_unreadable_torrent_is_rejected() {
        let channel = Arc::new(ScriptedChannel::new(|_, _| Ok(json!("OK"))));
        let pipeline = pipeline(channel.clone(), None);
        let source: SourceDescriptor = "/nonexistent/show.torrent".parse().unwrap();

        let report = pipeline
            .run_item(&source, &SelectionSet::default(), &CancellationToken::new())
            .await;

        assert_eq!(report.name, "show.torrent");
        assert!(matches!(report.status, ItemStatus::Rejected(SubmitError::NotFound { .. })));
        assert!(channel.methods().is_empty());
        assert_eq!(pipeline.metrics().snapshot().submissions_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported() {
        let channel = Arc::new(ScriptedChannel::new(|method, _| match method {
            ADD_URI => Ok(json!("gid1")),
            TELL_STATUS => Ok(json!({
                "status": "active",
                "totalLength": "100",
                "completedLength": "1"
            })),
            _ => Ok(json!("OK")),
        }));
        let pipeline = pipeline(channel, None);
        let source: SourceDescriptor = "magnet:?xt=urn:btih:abc".parse().unwrap();

        let report = pipeline
            .run_item(&source, &SelectionSet::default(), &CancellationToken::new())
            .await;

        assert!(matches!(report.status, ItemStatus::TimedOut));
        assert_eq!(pipeline.metrics().snapshot().sessions_timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_artifacts_relocated() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let file = staging.path().join("notes.txt");
        std::fs::write(&file, b"notes").unwrap();

        let reported = file.display().to_string();
        let channel = Arc::new(ScriptedChannel::new(move |method, _| match method {
            ADD_URI => Ok(json!("gid1")),
            TELL_STATUS => Ok(json!({
                "status": "complete",
                "totalLength": "5",
                "completedLength": "5",
                "files": [{"path": reported, "length": "5", "selected": "true"}]
            })),
            _ => Ok(json!("OK")),
        }));
        let pipeline = pipeline(channel, Some(output.path()));
        let source: SourceDescriptor = "magnet:?xt=urn:btih:abc".parse().unwrap();

        let report = pipeline
            .run_item(&source, &SelectionSet::default(), &CancellationToken::new())
            .await;

        match report.status {
            ItemStatus::Completed { artifacts } => {
                assert_eq!(artifacts, vec![output.path().join("notes.txt")]);
            }
            other => panic!("unexpected status {other}"),
        }
        assert_eq!(pipeline.metrics().snapshot().artifacts_relocated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_without_files_on_disk_fails() {
        let staging = TempDir::new().unwrap();
        let reported = staging.path().join("never-written.mkv").display().to_string();
        let channel = Arc::new(ScriptedChannel::new(move |method, _| match method {
            ADD_URI => Ok(json!("gid1")),
            TELL_STATUS => Ok(json!({
                "status": "complete",
                "totalLength": "5",
                "completedLength": "5",
                "files": [{"path": reported, "length": "5", "selected": "true"}]
            })),
            _ => Ok(json!("OK")),
        }));
        let pipeline = pipeline(channel, None);
        let source: SourceDescriptor = "magnet:?xt=urn:btih:abc".parse().unwrap();

        let report = pipeline
            .run_item(&source, &SelectionSet::default(), &CancellationToken::new())
            .await;

        assert!(!report.is_success());
        assert!(matches!(report.status, ItemStatus::Failed(SessionFailure::NoArtifacts)));
        let metrics = pipeline.metrics().snapshot();
        assert_eq!(metrics.sessions_completed, 0);
        assert_eq!(metrics.sessions_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inspect_removes_staged_job() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pack.torrent");
        std::fs::write(&path, b"d4:infod4:name1:aee").unwrap();

        let channel = Arc::new(ScriptedChannel::new(|method, _| match method {
            TELL_STATUS => Ok(json!({"files": [
                {"path": "/dl/a.mkv", "length": "100", "selected": "true"},
                {"path": "/dl/b.nfo", "length": "2", "selected": "true"}
            ]})),
            _ => Ok(json!("gid7")),
        }));
        let pipeline = pipeline(channel.clone(), None);

        let files = pipeline.inspect(&path).await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[1].index, 1);
        assert_eq!(files[0].size_bytes, 100);
        assert_eq!(channel.calls_to(REMOVE), vec![vec![json!("gid7")]]);
    }

    #[tokio::test]
    async fn test_list_output() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.srt"), b"12").unwrap();
        std::fs::write(dir.path().join("a.mkv"), b"1234").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let entries = list_output(dir.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![(dir.path().join("a.mkv"), 4), (dir.path().join("b.srt"), 2)]
        );
        assert!(list_output(&dir.path().join("missing")).await.unwrap().is_empty());
    }
}
