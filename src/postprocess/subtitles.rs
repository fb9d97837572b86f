//! Subtitle extraction through an external media tool

use crate::config::PostProcessConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch media tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("media tool did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Which subtitle stream to pull out of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSelector {
    Language(String),
    FirstSubtitle,
}

impl StreamSelector {
    pub fn map_arg(&self) -> String {
        match self {
            StreamSelector::Language(tag) => format!("0:s:m:language:{tag}"),
            StreamSelector::FirstSubtitle => "0:s:0".to_string(),
        }
    }
}

/// Runs one extraction. `Ok(true)` means the tool exited successfully; whether it produced
/// usable output is judged by the caller.
#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn extract(
        &self,
        input: &Path,
        stream: &StreamSelector,
        output: &Path,
    ) -> Result<bool, ToolError>;
}

/// `ffmpeg -y -i <input> -map <selector> <output>`
pub struct FfmpegTool {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn extract(
        &self,
        input: &Path,
        stream: &StreamSelector,
        output: &Path,
    ) -> Result<bool, ToolError> {
        let mut command = Command::new(&self.program);
        command
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-map")
            .arg(stream.map_arg())
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.status()).await {
            Ok(status) => Ok(status?.success()),
            Err(_) => Err(ToolError::TimedOut(self.timeout)),
        }
    }
}

/// Tries each preferred language in order, then the first subtitle stream of any language.
pub struct SubtitleExtractor {
    tool: Arc<dyn MediaTool>,
    languages: Vec<String>,
    min_bytes: u64,
}

impl SubtitleExtractor {
    pub fn new(tool: Arc<dyn MediaTool>, languages: Vec<String>, min_bytes: u64) -> Self {
        Self {
            tool,
            languages,
            min_bytes,
        }
    }

    pub fn from_config(config: &PostProcessConfig) -> Self {
        let tool = FfmpegTool::new(
            config.media_tool.clone(),
            Duration::from_millis(config.tool_timeout_ms),
        );
        Self::new(
            Arc::new(tool),
            config.subtitle_languages.clone(),
            config.min_subtitle_bytes.as_u64(),
        )
    }

    /// Returns the extracted subtitle file, if any. Never fails.
    pub async fn extract(&self, video: &Path) -> Vec<PathBuf> {
        info!(path = %video.display(), "Extracting subtitles");

        for tag in &self.languages {
            let output = sibling(video, &format!(".{tag}.srt"));
            let selector = StreamSelector::Language(tag.clone());
            if self.attempt(video, &selector, &output, Some(self.min_bytes)).await {
                info!(language = %tag, path = %output.display(), "Extracted subtitles");
                return vec![output];
            }
        }

        let output = sibling(video, ".srt");
        if self.attempt(video, &StreamSelector::FirstSubtitle, &output, None).await {
            info!(path = %output.display(), "Extracted first available subtitle");
            return vec![output];
        }

        Vec::new()
    }

    async fn attempt(
        &self,
        video: &Path,
        selector: &StreamSelector,
        output: &Path,
        min_bytes: Option<u64>,
    ) -> bool {
        let succeeded = match self.tool.extract(video, selector, output).await {
            Ok(true) => match tokio::fs::metadata(output).await {
                Ok(meta) => min_bytes.is_none_or(|min| meta.len() > min),
                Err(_) => false,
            },
            Ok(false) => false,
            Err(e) => {
                debug!(stream = %selector.map_arg(), error = %e, "Extraction attempt failed");
                false
            }
        };

        if !succeeded {
            // Drop empty or placeholder output so it is never mistaken for a subtitle
            let _ = tokio::fs::remove_file(output).await;
        }
        succeeded
    }
}

/// `dir/name.mkv` + `.fr.srt` -> `dir/name.fr.srt`
fn sibling(video: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = video.with_extension("").into_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
