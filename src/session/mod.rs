//! Download-session orchestration
//!
//! - [`JobSubmitter`] turns a [`SourceDescriptor`] into an engine job
//! - [`SelectionApplier`] narrows a paused job to a [`SelectionSet`] and releases it
//! - [`SessionMonitor`] polls the job into a terminal [`Session`]

mod model;
mod monitor;
mod observer;
mod selection;
mod submit;

pub use model::{
    FileEntry, InvalidSelection, SelectionSet, Session, SessionFailure, SessionState,
    SourceDescriptor, UnsupportedSource,
};
pub use monitor::{MonitorSettings, SessionMonitor};
pub use observer::{LogObserver, ProgressObserver, ProgressReport};
pub use selection::{FallbackReason, SelectionApplier, SelectionOutcome};
pub use submit::JobSubmitter;

use crate::rpc::ChannelError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedSource),

    #[error("invalid magnet URI: {0}")]
    InvalidSource(String),

    #[error("cannot read torrent file {}: {source}", .path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine call failed: {0}")]
    ChannelFailure(#[from] ChannelError),

    #[error("engine accepted {method} without returning a job id")]
    NoHandle { method: String },

    #[error("no requested file index {requested:?} exists in a job of {total} file(s)")]
    NothingSelected { requested: Vec<usize>, total: usize },
}
