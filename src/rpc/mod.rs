//! Control channel to the external download engine
//!
//! [`ControlChannel`] is the seam every other component talks through. [`RpcClient`] is the
//! HTTP implementation; tests substitute scripted engines.

mod client;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use client::{RpcClient, RpcSettings};
pub use types::{EngineFile, JobHandle, RemoteStatus, StatusSnapshot};

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

pub const ADD_URI: &str = "aria2.addUri";
pub const ADD_TORRENT: &str = "aria2.addTorrent";
pub const TELL_STATUS: &str = "aria2.tellStatus";
pub const CHANGE_OPTION: &str = "aria2.changeOption";
pub const UNPAUSE: &str = "aria2.unpause";
pub const REMOVE: &str = "aria2.remove";
pub const GET_VERSION: &str = "aria2.getVersion";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("engine unreachable after {attempts} attempt(s) calling {method}: {last_error}")]
    Unreachable {
        method: String,
        attempts: u32,
        last_error: String,
    },

    #[error("engine rejected {method}: [{code}] {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },

    #[error("malformed response to {method}: {reason}")]
    MalformedResponse { method: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Request/response transport to the engine.
///
/// Implementations must be stateless per call so one channel can be shared by concurrent
/// pipelines. The typed helpers all funnel through [`ControlChannel::call`].
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Invoke `method` with positional `params`, returning the `result` member.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;

    async fn add_uri(&self, uris: Vec<String>, options: Value) -> Result<Value> {
        self.call(ADD_URI, vec![json!(uris), options]).await
    }

    async fn add_torrent(&self, encoded: String, options: Value) -> Result<Value> {
        self.call(ADD_TORRENT, vec![json!(encoded), json!([]), options])
            .await
    }

    async fn tell_status(&self, handle: &JobHandle, keys: &[&str]) -> Result<StatusSnapshot> {
        let value = self
            .call(TELL_STATUS, vec![json!(handle.as_str()), json!(keys)])
            .await?;
        serde_json::from_value(value).map_err(|e| ChannelError::MalformedResponse {
            method: TELL_STATUS.to_string(),
            reason: e.to_string(),
        })
    }

    async fn change_option(&self, handle: &JobHandle, options: Value) -> Result<()> {
        self.call(CHANGE_OPTION, vec![json!(handle.as_str()), options])
            .await
            .map(|_| ())
    }

    /// Restrict a job to the files whose entry in `marks` is `true`.
    ///
    /// `marks` is indexed by zero-based position in the engine's file list; the engine's
    /// `select-file` option takes the one-based positions as a comma-separated list.
    async fn select_files(&self, handle: &JobHandle, marks: &[bool]) -> Result<()> {
        let positions: Vec<String> = marks
            .iter()
            .enumerate()
            .filter(|(_, selected)| **selected)
            .map(|(index, _)| (index + 1).to_string())
            .collect();
        self.change_option(handle, json!({ "select-file": positions.join(",") }))
            .await
    }

    async fn unpause(&self, handle: &JobHandle) -> Result<()> {
        self.call(UNPAUSE, vec![json!(handle.as_str())])
            .await
            .map(|_| ())
    }

    async fn remove(&self, handle: &JobHandle) -> Result<()> {
        self.call(REMOVE, vec![json!(handle.as_str())])
            .await
            .map(|_| ())
    }

    /// Liveness check
    async fn get_version(&self) -> Result<Value> {
        self.call(GET_VERSION, Vec::new()).await
    }
}
