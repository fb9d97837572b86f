//! Selective-file application for paused jobs
//!
//! Engine failures never abort the session: anything that goes wrong releases the job with every
//! file active, since a job left paused would stall silently. A selection that names no file of
//! the job is reported back unapplied and the job stays paused.

use super::model::{FileEntry, SelectionSet};
use crate::config::SessionConfig;
use crate::rpc::{ControlChannel, JobHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why the requested selection was abandoned in favour of downloading everything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    MetadataUnavailable,
    SelectFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Applied {
        selected: usize,
        total: usize,
        dropped: Vec<usize>,
    },
    FellOpen(FallbackReason),
    /// Every requested index was out of range. Nothing was sent and the job is still paused.
    NothingSelected { total: usize, dropped: Vec<usize> },
}

pub struct SelectionApplier {
    channel: Arc<dyn ControlChannel>,
    metadata_wait: Duration,
    poll_interval: Duration,
}

impl SelectionApplier {
    pub fn new(
        channel: Arc<dyn ControlChannel>,
        metadata_wait: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            channel,
            metadata_wait,
            poll_interval,
        }
    }

    pub fn from_config(channel: Arc<dyn ControlChannel>, config: &SessionConfig) -> Self {
        Self::new(
            channel,
            Duration::from_millis(config.metadata_wait_ms),
            Duration::from_millis(config.metadata_poll_interval_ms),
        )
    }

    /// Poll until the job's file list is known, giving up once the metadata wait has elapsed.
    /// A query still in flight at the deadline is abandoned. Returns an empty list on timeout.
    pub async fn wait_for_files(&self, handle: &JobHandle) -> Vec<FileEntry> {
        let deadline = Instant::now() + self.metadata_wait;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let query = self.channel.tell_status(handle, &["files"]);
            match tokio::time::timeout(remaining, query).await {
                Ok(Ok(snapshot)) if !snapshot.files.is_empty() => {
                    return FileEntry::list(&snapshot.files);
                }
                Ok(Ok(_)) => debug!(gid = %handle, attempt, "File list not yet available"),
                Ok(Err(e)) => {
                    debug!(gid = %handle, attempt, error = %e, "File list query failed");
                }
                Err(_) => {
                    debug!(gid = %handle, attempt, "File list query outlived the metadata wait");
                    break;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
            if Instant::now() >= deadline {
                break;
            }
        }

        Vec::new()
    }

    /// Mark exactly `selection ∩ [0, N)` as selected, then unpause.
    pub async fn apply(&self, handle: &JobHandle, selection: &SelectionSet) -> SelectionOutcome {
        info!(gid = %handle, requested = selection.len(), "Applying file selection");

        let files = self.wait_for_files(handle).await;
        if files.is_empty() {
            warn!(gid = %handle, "Could not get file list, downloading all files");
            return self.fall_open(handle, 0, FallbackReason::MetadataUnavailable).await;
        }

        let total = files.len();
        let effective = selection.within(total);
        let dropped = selection.beyond(total);
        if !dropped.is_empty() {
            warn!(gid = %handle, ?dropped, total, "Ignoring out-of-range file indices");
        }
        if effective.is_empty() {
            warn!(gid = %handle, total, "No requested index exists in this job");
            return SelectionOutcome::NothingSelected { total, dropped };
        }

        let marks: Vec<bool> = (0..total).map(|index| effective.contains(index)).collect();
        if let Err(e) = self.channel.select_files(handle, &marks).await {
            warn!(gid = %handle, error = %e, "File selection failed, downloading all files");
            return self
                .fall_open(handle, total, FallbackReason::SelectFailed(e.to_string()))
                .await;
        }

        self.release(handle).await;
        info!(gid = %handle, selected = effective.len(), total, "File selection applied");

        SelectionOutcome::Applied {
            selected: effective.len(),
            total,
            dropped,
        }
    }

    async fn fall_open(
        &self,
        handle: &JobHandle,
        total: usize,
        reason: FallbackReason,
    ) -> SelectionOutcome {
        if total > 0 {
            if let Err(e) = self.channel.select_files(handle, &vec![true; total]).await {
                debug!(gid = %handle, error = %e, "Best-effort select of every file failed");
            }
        }
        self.release(handle).await;
        SelectionOutcome::FellOpen(reason)
    }

    async fn release(&self, handle: &JobHandle) {
        if let Err(e) = self.channel.unpause(handle).await {
            warn!(gid = %handle, error = %e, "Failed to unpause job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::ScriptedChannel;
    use crate::rpc::{CHANGE_OPTION, ChannelError, TELL_STATUS, UNPAUSE};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn three_files() -> Value {
        json!({"files": [
            {"index": "1", "path": "/dl/t/a.mkv", "length": "100"},
            {"index": "2", "path": "/dl/t/b.mkv", "length": "200"},
            {"index": "3", "path": "/dl/t/c.mkv", "length": "300"}
        ]})
    }

    fn applier(channel: Arc<dyn ControlChannel>) -> SelectionApplier {
        SelectionApplier::new(channel, Duration::from_secs(15), Duration::from_secs(1))
    }

    /// One-based positions carried by a `changeOption` call
    fn positions(params: &[Value]) -> BTreeSet<usize> {
        params[1]["select-file"]
            .as_str()
            .unwrap()
            .split(',')
            .filter(|p| !p.is_empty())
            .map(|p| p.parse().unwrap())
            .collect()
    }

    /// Engine whose selection is replaced wholesale by each `select-file` option
    fn selecting_engine(state: Arc<Mutex<Option<BTreeSet<usize>>>>) -> ScriptedChannel {
        ScriptedChannel::new(move |method, params| match method {
            TELL_STATUS => Ok(three_files()),
            CHANGE_OPTION => {
                *state.lock().unwrap() = Some(positions(params));
                Ok(json!("OK"))
            }
            _ => Ok(json!("OK")),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_exactly_selected_indices() {
        let state = Arc::new(Mutex::new(None));
        let channel = Arc::new(selecting_engine(state.clone()));

        let outcome = applier(channel.clone())
            .apply(&JobHandle::new("gid"), &SelectionSet::new([0, 2, 9]))
            .await;

        assert_eq!(
            outcome,
            SelectionOutcome::Applied { selected: 2, total: 3, dropped: vec![9] }
        );
        let calls = channel.calls_to(CHANGE_OPTION);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![json!("gid"), json!({"select-file": "1,3"})]);
        assert_eq!(state.lock().unwrap().clone(), Some(BTreeSet::from([1, 3])));
        assert_eq!(channel.calls_to(UNPAUSE).len(), 1);
        assert_eq!(channel.methods().last().map(String::as_str), Some(UNPAUSE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reapplying_is_idempotent() {
        let state = Arc::new(Mutex::new(None));
        let channel = Arc::new(selecting_engine(state.clone()));
        let applier = applier(channel);
        let selection = SelectionSet::new([1]);

        applier.apply(&JobHandle::new("gid"), &selection).await;
        let first = state.lock().unwrap().clone();
        applier.apply(&JobHandle::new("gid"), &selection).await;
        let second = state.lock().unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(second, Some(BTreeSet::from([2])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_metadata_fails_open() {
        let channel = Arc::new(ScriptedChannel::new(|method, _| match method {
            TELL_STATUS => Ok(json!({"files": []})),
            _ => Ok(json!("OK")),
        }));

        let outcome = applier(channel.clone())
            .apply(&JobHandle::new("gid"), &SelectionSet::new([0]))
            .await;

        assert_eq!(outcome, SelectionOutcome::FellOpen(FallbackReason::MetadataUnavailable));
        assert_eq!(channel.calls_to(TELL_STATUS).len(), 15);
        assert!(channel.calls_to(CHANGE_OPTION).is_empty());
        assert_eq!(channel.calls_to(UNPAUSE).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_failure_selects_everything() {
        let state = Arc::new(Mutex::new(None));
        let inner = state.clone();
        let channel = Arc::new(ScriptedChannel::new(move |method, params| match method {
            TELL_STATUS => Ok(three_files()),
            CHANGE_OPTION => {
                let requested = positions(params);
                if requested.len() < 3 {
                    return Err(ChannelError::Remote {
                        method: CHANGE_OPTION.to_string(),
                        code: 1,
                        message: "boom".to_string(),
                    });
                }
                *inner.lock().unwrap() = Some(requested);
                Ok(json!("OK"))
            }
            _ => Ok(json!("OK")),
        }));

        let outcome = applier(channel.clone())
            .apply(&JobHandle::new("gid"), &SelectionSet::new([0]))
            .await;

        assert!(matches!(
            outcome,
            SelectionOutcome::FellOpen(FallbackReason::SelectFailed(_))
        ));
        assert_eq!(state.lock().unwrap().clone(), Some(BTreeSet::from([1, 2, 3])));
        assert_eq!(channel.calls_to(CHANGE_OPTION).len(), 2);
        assert_eq!(channel.calls_to(UNPAUSE).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_only_selection_selects_nothing() {
        let state = Arc::new(Mutex::new(None));
        let channel = Arc::new(selecting_engine(state.clone()));

        let outcome = applier(channel.clone())
            .apply(&JobHandle::new("gid"), &SelectionSet::new([5, 6]))
            .await;

        assert_eq!(
            outcome,
            SelectionOutcome::NothingSelected { total: 3, dropped: vec![5, 6] }
        );
        assert_eq!(*state.lock().unwrap(), None);
        assert!(channel.calls_to(CHANGE_OPTION).is_empty());
        assert!(channel.calls_to(UNPAUSE).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_files_tolerates_query_errors() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let channel = Arc::new(ScriptedChannel::new(move |_, _| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n < 3 {
                Err(ChannelError::Unreachable {
                    method: TELL_STATUS.to_string(),
                    attempts: 3,
                    last_error: "connection refused".to_string(),
                })
            } else {
                Ok(three_files())
            }
        }));

        let files = applier(channel).wait_for_files(&JobHandle::new("gid")).await;
        assert_eq!(files.len(), 3);
        assert_eq!(files[2].size_bytes, 300);
    }

    /// Channel whose every call hangs for `delay` before failing, like a client stuck in retries
    struct SlowChannel {
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ControlChannel for SlowChannel {
        async fn call(&self, method: &str, _params: Vec<Value>) -> crate::rpc::Result<Value> {
            self.calls.lock().unwrap().push(method.to_string());
            tokio::time::sleep(self.delay).await;
            Err(ChannelError::Unreachable {
                method: method.to_string(),
                attempts: 3,
                last_error: "operation timed out".to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_wait_bounds_slow_queries() {
        let channel = Arc::new(SlowChannel {
            delay: Duration::from_secs(47),
            calls: Mutex::new(Vec::new()),
        });

        let started = Instant::now();
        let files = applier(channel.clone()).wait_for_files(&JobHandle::new("gid")).await;

        assert!(files.is_empty());
        assert!(started.elapsed() <= Duration::from_secs(15));
        assert_eq!(*channel.calls.lock().unwrap(), vec![TELL_STATUS.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_metadata_still_fails_open() {
        let channel = Arc::new(SlowChannel {
            delay: Duration::from_secs(47),
            calls: Mutex::new(Vec::new()),
        });

        let started = Instant::now();
        let outcome = applier(channel.clone())
            .apply(&JobHandle::new("gid"), &SelectionSet::new([0]))
            .await;

        assert_eq!(outcome, SelectionOutcome::FellOpen(FallbackReason::MetadataUnavailable));
        // The unpause itself is slow; only the metadata wait is bounded.
        assert!(started.elapsed() <= Duration::from_secs(15 + 47));
        assert_eq!(channel.calls.lock().unwrap().last().map(String::as_str), Some(UNPAUSE));
    }
}
