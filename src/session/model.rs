use crate::rpc::{EngineFile, JobHandle, StatusSnapshot};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DISPLAY_NAME_LIMIT: usize = 50;

/// What to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Magnet(String),
    TorrentFile(PathBuf),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported item '{0}': expected a magnet URI or a .torrent file")]
pub struct UnsupportedSource(pub String);

impl FromStr for SourceDescriptor {
    type Err = UnsupportedSource;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.starts_with("magnet:") {
            return Ok(SourceDescriptor::Magnet(raw.to_string()));
        }

        let path = Path::new(raw);
        let is_torrent = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("torrent"));
        if is_torrent {
            return Ok(SourceDescriptor::TorrentFile(path.to_path_buf()));
        }

        Err(UnsupportedSource(raw.to_string()))
    }
}

impl SourceDescriptor {
    /// Short label for logs and reports: the file name for torrents, the URI for magnets.
    pub fn display_name(&self) -> String {
        let full = match self {
            SourceDescriptor::Magnet(uri) => uri.clone(),
            SourceDescriptor::TorrentFile(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };
        full.chars().take(DISPLAY_NAME_LIMIT).collect()
    }
}

/// Zero-based file indices to download; empty means every file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet(BTreeSet<usize>);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid file index '{0}'")]
pub struct InvalidSelection(pub String);

impl SelectionSet {
    pub fn new(indices: impl IntoIterator<Item = usize>) -> Self {
        Self(indices.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// The part of the selection that exists in a job of `file_count` files.
    pub fn within(&self, file_count: usize) -> SelectionSet {
        Self(self.0.range(..file_count).copied().collect())
    }

    /// Indices that fall outside a job of `file_count` files.
    pub fn beyond(&self, file_count: usize) -> Vec<usize> {
        self.0.range(file_count..).copied().collect()
    }
}

impl FromIterator<usize> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Parses `"0,2,5"`; blanks are ignored
impl FromStr for SelectionSet {
    type Err = InvalidSelection;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<usize>()
                    .map_err(|_| InvalidSelection(part.to_string()))
            })
            .collect()
    }
}

/// One file of a job as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Position in the engine's file list
    pub index: usize,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub selected: bool,
}

impl FileEntry {
    pub fn from_engine(index: usize, file: &EngineFile) -> Self {
        Self {
            index,
            path: PathBuf::from(&file.path),
            size_bytes: file.length,
            selected: file.selected,
        }
    }

    pub fn list(files: &[EngineFile]) -> Vec<FileEntry> {
        files
            .iter()
            .enumerate()
            .map(|(index, file)| FileEntry::from_engine(index, file))
            .collect()
    }
}

/// Local lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Submitted,
    Active,
    Completed,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::TimedOut
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Submitted => "submitted",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::TimedOut => "timed out",
        };
        f.write_str(label)
    }
}

/// Why a session ended without artifacts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFailure {
    #[error("engine reported an error{}", remote_detail(.0))]
    RemoteError(Option<String>),

    #[error("job was removed from the engine")]
    Removed,

    #[error("no terminal status after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("engine reported completion but no file was found on disk")]
    NoArtifacts,
}

fn remote_detail(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

/// Reconciliation record for one job.
///
/// Once a terminal state is reached every mutator is a no-op, so a session transitions to a
/// terminal state at most once and never returns to `Active`.
#[derive(Debug, Clone)]
pub struct Session {
    pub handle: JobHandle,
    pub display_name: String,
    pub started_at: DateTime<Utc>,
    pub last_progress_at: Option<DateTime<Utc>>,
    pub completed_bytes: u64,
    pub total_bytes: u64,
    pub download_speed: u64,
    state: SessionState,
    artifact_paths: Vec<PathBuf>,
    failure: Option<SessionFailure>,
}

impl Session {
    pub fn new(handle: JobHandle, display_name: impl Into<String>) -> Self {
        Self {
            handle,
            display_name: display_name.into(),
            started_at: Utc::now(),
            last_progress_at: None,
            completed_bytes: 0,
            total_bytes: 0,
            download_speed: 0,
            state: SessionState::Submitted,
            artifact_paths: Vec::new(),
            failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifact_paths
    }

    pub fn into_artifacts(self) -> Vec<PathBuf> {
        self.artifact_paths
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        self.failure.as_ref()
    }

    /// Fold counters from a non-terminal poll. Moves `Submitted` to `Active`.
    pub fn record(&mut self, snapshot: &StatusSnapshot) {
        if self.state.is_terminal() {
            return;
        }
        if snapshot.completed_length > self.completed_bytes {
            self.last_progress_at = Some(Utc::now());
        }
        self.completed_bytes = snapshot.completed_length;
        self.total_bytes = snapshot.total_length;
        self.download_speed = snapshot.download_speed;
        self.state = SessionState::Active;
    }

    /// Returns the new state only when this call performed the transition.
    pub fn complete(&mut self, artifacts: Vec<PathBuf>) -> Option<SessionState> {
        if self.state.is_terminal() {
            return None;
        }
        self.artifact_paths = artifacts;
        self.state = SessionState::Completed;
        Some(self.state)
    }

    pub fn fail(&mut self, failure: SessionFailure) -> Option<SessionState> {
        if self.state.is_terminal() {
            return None;
        }
        let state = match failure {
            SessionFailure::TimedOut(_) => SessionState::TimedOut,
            _ => SessionState::Failed,
        };
        self.artifact_paths.clear();
        self.failure = Some(failure);
        self.state = state;
        Some(state)
    }

    /// Completed fraction in percent, 0 while the total is unknown
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.completed_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    /// Remaining bytes divided by the current rate, floored at 1 B/s
    pub fn eta(&self) -> Duration {
        let remaining = self.total_bytes.saturating_sub(self.completed_bytes);
        Duration::from_secs(remaining / self.download_speed.max(1))
    }
}
