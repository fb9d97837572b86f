//! Post-processing of completed downloads
//!
//! Video artifacts get their subtitles extracted next to them, then every artifact and
//! subtitle is moved into the output directory. Nothing here aborts a download: problems are
//! collected as [`ProcessingWarning`]s and logged.

mod relocate;
mod subtitles;

pub use relocate::{RelocateError, Relocation, relocate};
pub use subtitles::{FfmpegTool, MediaTool, StreamSelector, SubtitleExtractor, ToolError};

use crate::config::PostProcessConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Video,
    Other,
}

impl ArtifactKind {
    pub fn classify(path: &Path) -> Self {
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)));
        if is_video {
            ArtifactKind::Video
        } else {
            ArtifactKind::Other
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessingWarning {
    #[error("no subtitles found in {}", .0.display())]
    NoSubtitles(PathBuf),

    #[error(transparent)]
    Relocation(#[from] RelocateError),
}

/// One artifact after processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedArtifact {
    pub kind: ArtifactKind,
    pub location: PathBuf,
    /// False when the artifact had to stay in the download directory
    pub relocated: bool,
    pub subtitles: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ProcessingReport {
    pub artifacts: Vec<ProcessedArtifact>,
    pub warnings: Vec<ProcessingWarning>,
}

impl ProcessingReport {
    /// Files that now live in the output directory, subtitles included
    pub fn relocated_count(&self) -> usize {
        self.artifacts
            .iter()
            .map(|a| usize::from(a.relocated) + a.subtitles.len())
            .sum()
    }
}

pub struct PostProcessor {
    extractor: SubtitleExtractor,
    output_dir: PathBuf,
}

impl PostProcessor {
    pub fn new(extractor: SubtitleExtractor, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &PostProcessConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self::new(SubtitleExtractor::from_config(config), output_dir)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn process(&self, artifacts: &[PathBuf]) -> ProcessingReport {
        let mut report = ProcessingReport::default();

        for artifact in artifacts {
            let kind = ArtifactKind::classify(artifact);
            let present = tokio::fs::try_exists(artifact).await.unwrap_or(false);

            let mut extracted = Vec::new();
            if present && kind == ArtifactKind::Video {
                extracted = self.extractor.extract(artifact).await;
                if extracted.is_empty() {
                    report.warnings.push(ProcessingWarning::NoSubtitles(artifact.clone()));
                }
            }

            let mut subtitles = Vec::with_capacity(extracted.len());
            for subtitle in &extracted {
                match relocate(subtitle, &self.output_dir).await {
                    Ok(moved) => subtitles.push(moved.destination().to_path_buf()),
                    Err(e) => report.warnings.push(e.into()),
                }
            }

            match relocate(artifact, &self.output_dir).await {
                Ok(moved) => {
                    info!(path = %moved.destination().display(), ?kind, "Artifact ready");
                    report.artifacts.push(ProcessedArtifact {
                        kind,
                        location: moved.destination().to_path_buf(),
                        relocated: true,
                        subtitles,
                    });
                }
                Err(e) => {
                    if let RelocateError::Collision { artifact: kept, .. } = &e {
                        report.artifacts.push(ProcessedArtifact {
                            kind,
                            location: kept.clone(),
                            relocated: false,
                            subtitles,
                        });
                    }
                    report.warnings.push(e.into());
                }
            }
        }

        for warning in &report.warnings {
            warn!(warning = %warning, "Post-processing");
        }
        report
    }
}
