//! Job submission: magnet URIs and local torrent descriptors

use super::SubmitError;
use super::model::{SelectionSet, SourceDescriptor};
use super::selection::{SelectionApplier, SelectionOutcome};
use crate::config::SubmitConfig;
use crate::rpc::{ADD_TORRENT, ADD_URI, ControlChannel, JobHandle};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct JobSubmitter {
    channel: Arc<dyn ControlChannel>,
    applier: SelectionApplier,
    download_dir: PathBuf,
    options: SubmitConfig,
}

impl JobSubmitter {
    pub fn new(
        channel: Arc<dyn ControlChannel>,
        applier: SelectionApplier,
        download_dir: PathBuf,
        options: SubmitConfig,
    ) -> Self {
        Self {
            channel,
            applier,
            download_dir,
            options,
        }
    }

    pub fn applier(&self) -> &SelectionApplier {
        &self.applier
    }

    pub async fn submit(
        &self,
        source: &SourceDescriptor,
        selection: &SelectionSet,
    ) -> Result<JobHandle, SubmitError> {
        match source {
            SourceDescriptor::Magnet(uri) => {
                if !selection.is_empty() {
                    warn!("File selection is ignored for magnet links, downloading everything");
                }
                self.submit_magnet(uri).await
            }
            SourceDescriptor::TorrentFile(path) => self.submit_torrent_file(path, selection).await,
        }
    }

    pub async fn submit_magnet(&self, uri: &str) -> Result<JobHandle, SubmitError> {
        if !uri.starts_with("magnet:?") {
            return Err(SubmitError::InvalidSource(uri.to_string()));
        }

        let result = self
            .channel
            .add_uri(vec![uri.to_string()], self.magnet_options())
            .await?;
        let handle = handle_from(result, ADD_URI)?;

        info!(gid = %handle, "Magnet submitted");
        Ok(handle)
    }

    /// Submit a descriptor; with a non-empty selection the job starts paused and is released by
    /// the selection applier.
    pub async fn submit_torrent_file(
        &self,
        path: &Path,
        selection: &SelectionSet,
    ) -> Result<JobHandle, SubmitError> {
        let handle = self.add_torrent(path, !selection.is_empty()).await?;

        if !selection.is_empty() {
            match self.applier.apply(&handle, selection).await {
                SelectionOutcome::Applied { .. } => {}
                SelectionOutcome::FellOpen(reason) => {
                    warn!(gid = %handle, ?reason, "Selection not applied, all files will download");
                }
                SelectionOutcome::NothingSelected { total, .. } => {
                    if let Err(e) = self.channel.remove(&handle).await {
                        warn!(gid = %handle, error = %e, "Failed to remove unselectable job");
                    }
                    return Err(SubmitError::NothingSelected {
                        requested: selection.iter().collect(),
                        total,
                    });
                }
            }
        }

        Ok(handle)
    }

    /// Submit a descriptor paused so its file list can be inspected without transferring data.
    pub async fn stage_torrent_file(&self, path: &Path) -> Result<JobHandle, SubmitError> {
        self.add_torrent(path, true).await
    }

    async fn add_torrent(&self, path: &Path, pause: bool) -> Result<JobHandle, SubmitError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SubmitError::NotFound {
                path: path.to_path_buf(),
                source,
            })?;

        let encoded = STANDARD.encode(&bytes);
        let result = self
            .channel
            .add_torrent(encoded, self.torrent_options(pause))
            .await?;
        let handle = handle_from(result, ADD_TORRENT)?;

        info!(gid = %handle, path = %path.display(), pause, "Torrent submitted");
        Ok(handle)
    }

    fn base_options(&self) -> Map<String, Value> {
        let mut options = Map::new();
        options.insert("dir".into(), json!(self.download_dir.display().to_string()));
        options.insert("seed-ratio".into(), json!("0.0"));
        options.insert("max-upload-limit".into(), json!(self.options.max_upload_limit));
        options
    }

    fn magnet_options(&self) -> Value {
        let timeout = self.options.tracker_timeout_secs.to_string();
        let mut options = self.base_options();
        options.insert("bt-tracker".into(), json!(self.options.trackers.join(",")));
        options.insert("bt-tracker-connect-timeout".into(), json!(timeout));
        options.insert("bt-tracker-timeout".into(), json!(timeout));
        options.insert("follow-torrent".into(), json!("mem"));
        options.insert("enable-dht".into(), json!("true"));
        options.insert("enable-peer-exchange".into(), json!("true"));
        Value::Object(options)
    }

    fn torrent_options(&self, pause: bool) -> Value {
        let mut options = self.base_options();
        options.insert("pause".into(), json!(pause.to_string()));
        Value::Object(options)
    }
}

fn handle_from(result: Value, method: &str) -> Result<JobHandle, SubmitError> {
    match result.as_str() {
        Some(gid) if !gid.is_empty() => Ok(JobHandle::new(gid)),
        _ => Err(SubmitError::NoHandle {
            method: method.to_string(),
        }),
    }
}
