//! Lifecycle of the managed aria2 process

use crate::config::Config;
use crate::rpc::ControlChannel;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine exited before becoming ready ({status})")]
    Exited { status: String },

    #[error("engine did not answer after {attempts} attempt(s)")]
    NotReady { attempts: u32 },
}

/// Command-line flags for an RPC-enabled, leech-only aria2 instance
pub fn engine_args(config: &Config) -> Vec<OsString> {
    let engine = &config.engine;
    let submit = &config.submit;
    let mut args: Vec<OsString> = vec![
        "--enable-rpc=true".into(),
        format!("--rpc-listen-port={}", engine.rpc_port).into(),
        "--rpc-listen-all=true".into(),
        "--rpc-allow-origin-all=true".into(),
        "--dir".into(),
        config.paths.download_dir.clone().into_os_string(),
        "--continue=true".into(),
        format!("--max-concurrent-downloads={}", engine.max_concurrent_downloads).into(),
        format!("--max-connection-per-server={}", engine.max_connection_per_server).into(),
        format!("--split={}", engine.split).into(),
        format!("--min-split-size={}", engine.min_split_size.as_u64()).into(),
        "--seed-ratio=0.0".into(),
        format!("--max-upload-limit={}", submit.max_upload_limit).into(),
        format!("--bt-tracker-connect-timeout={}", submit.tracker_timeout_secs).into(),
        format!("--bt-tracker-timeout={}", submit.tracker_timeout_secs).into(),
        "--follow-torrent=mem".into(),
        "--bt-save-metadata=true".into(),
        "--enable-dht=true".into(),
        "--enable-peer-exchange=true".into(),
        format!("--dht-entry-point={}", engine.dht_entry_point).into(),
        "--quiet".into(),
    ];
    args.extend(engine.extra_args.iter().map(OsString::from));
    args
}

/// A running engine. Dropping it kills the process.
pub struct EngineProcess {
    child: Child,
}

impl EngineProcess {
    pub fn spawn(config: &Config) -> Result<Self, EngineError> {
        let binary: &Path = &config.engine.binary;
        let child = Command::new(binary)
            .args(engine_args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                binary: binary.display().to_string(),
                source,
            })?;

        info!(pid = ?child.id(), port = config.engine.rpc_port, "Engine started");
        Ok(Self { child })
    }

    /// Spawn the engine and block until it answers `getVersion`.
    pub async fn start(config: &Config, channel: &dyn ControlChannel) -> Result<Self, EngineError> {
        let mut process = Self::spawn(config)?;
        if let Err(e) = process
            .wait_ready(channel, config.engine.ready_attempts, config.engine.ready_interval())
            .await
        {
            process.shutdown().await;
            return Err(e);
        }
        Ok(process)
    }

    /// Poll until the engine answers, failing early as soon as the process has exited.
    pub async fn wait_ready(
        &mut self,
        channel: &dyn ControlChannel,
        attempts: u32,
        interval: Duration,
    ) -> Result<(), EngineError> {
        let child = &mut self.child;
        poll_until_ready(channel, attempts, interval, || match child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Could not query engine process state");
                None
            }
        })
        .await
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to stop engine");
            return;
        }
        info!("Engine stopped");
    }
}

/// Call `getVersion` up to `attempts` times, sleeping `interval` between failures.
pub async fn wait_until_ready(
    channel: &dyn ControlChannel,
    attempts: u32,
    interval: Duration,
) -> Result<(), EngineError> {
    poll_until_ready(channel, attempts, interval, || None).await
}

/// `exited` is consulted before every attempt and reports the exit status of a dead engine.
async fn poll_until_ready(
    channel: &dyn ControlChannel,
    attempts: u32,
    interval: Duration,
    mut exited: impl FnMut() -> Option<String>,
) -> Result<(), EngineError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(status) = exited() {
            return Err(EngineError::Exited { status });
        }
        match channel.get_version().await {
            Ok(reply) => {
                let version = reply["version"].as_str().unwrap_or("unknown");
                info!(version, "Engine ready");
                return Ok(());
            }
            Err(e) => debug!(attempt, error = %e, "Engine not ready yet"),
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(EngineError::NotReady { attempts })
}
