//! In-memory stand-in for the aria2 engine

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use torrentbox::rpc::{
    ADD_TORRENT, ADD_URI, CHANGE_OPTION, ChannelError, ControlChannel, GET_VERSION, REMOVE, Result,
    TELL_STATUS, UNPAUSE,
};

/// How a job ends once it has been polled enough times while running
#[derive(Debug, Clone)]
pub enum Ending {
    Complete,
    Error(String),
    Never,
}

struct Job {
    paused: bool,
    removed: bool,
    selected: Vec<bool>,
    active_polls: u32,
    materialized: bool,
}

/// Every job contains the same file list; completion writes only the selected files to disk.
pub struct FakeEngine {
    download_dir: PathBuf,
    files: Vec<(String, u64)>,
    ending: Ending,
    polls_to_finish: u32,
    jobs: Mutex<HashMap<String, Job>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl FakeEngine {
    pub fn new(download_dir: &Path, files: &[(&str, u64)], ending: Ending) -> Self {
        Self {
            download_dir: download_dir.to_path_buf(),
            files: files.iter().map(|(name, size)| (name.to_string(), *size)).collect(),
            ending,
            polls_to_finish: 3,
            jobs: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn path_of(&self, index: usize) -> PathBuf {
        self.download_dir.join(&self.files[index].0)
    }

    pub fn calls_to(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    fn add_job(&self, paused: bool) -> Value {
        let mut jobs = self.jobs.lock().unwrap();
        let gid = format!("{:016x}", jobs.len() + 1);
        jobs.insert(
            gid.clone(),
            Job {
                paused,
                removed: false,
                selected: vec![true; self.files.len()],
                active_polls: 0,
                materialized: false,
            },
        );
        json!(gid)
    }

    fn status(&self, gid: &str) -> Result<Value> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(gid).ok_or_else(|| unknown_gid(TELL_STATUS, gid))?;

        let total: u64 = self
            .files
            .iter()
            .zip(&job.selected)
            .filter(|(_, selected)| **selected)
            .map(|((_, size), _)| size)
            .sum();

        let mut status = "paused";
        let mut completed = 0;
        let mut error_message = None;
        if job.removed {
            status = "removed";
        } else if !job.paused {
            job.active_polls += 1;
            status = "active";
            completed = total / 2;
            if job.active_polls >= self.polls_to_finish {
                match &self.ending {
                    Ending::Complete => {
                        if !job.materialized {
                            self.materialize(&job.selected);
                            job.materialized = true;
                        }
                        status = "complete";
                        completed = total;
                    }
                    Ending::Error(message) => {
                        status = "error";
                        error_message = Some(message.clone());
                    }
                    Ending::Never => {}
                }
            }
        }

        let files: Vec<Value> = self
            .files
            .iter()
            .zip(&job.selected)
            .enumerate()
            .map(|(index, ((_, size), selected))| {
                json!({
                    "index": (index + 1).to_string(),
                    "path": self.path_of(index).display().to_string(),
                    "length": size.to_string(),
                    "selected": selected.to_string(),
                })
            })
            .collect();

        let mut body = json!({
            "gid": gid,
            "status": status,
            "totalLength": total.to_string(),
            "completedLength": completed.to_string(),
            "downloadSpeed": "1048576",
            "files": files,
        });
        if let Some(message) = error_message {
            body["errorMessage"] = json!(message);
        }
        Ok(body)
    }

    fn materialize(&self, selected: &[bool]) {
        std::fs::create_dir_all(&self.download_dir).unwrap();
        for (index, (_, size)) in self.files.iter().enumerate() {
            if selected[index] {
                std::fs::write(self.path_of(index), vec![0u8; *size as usize]).unwrap();
            }
        }
    }

    fn with_job(
        &self,
        method: &str,
        params: &[Value],
        apply: impl FnOnce(&mut Job),
    ) -> Result<Value> {
        let gid = params.first().and_then(Value::as_str).unwrap_or_default();
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(gid).ok_or_else(|| unknown_gid(method, gid))?;
        apply(job);
        Ok(json!(gid))
    }
}

fn unknown_gid(method: &str, gid: &str) -> ChannelError {
    ChannelError::Remote {
        method: method.to_string(),
        code: 1,
        message: format!("GID {gid} is not found"),
    }
}

#[async_trait]
impl ControlChannel for FakeEngine {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        match method {
            ADD_URI => Ok(self.add_job(false)),
            ADD_TORRENT => {
                let paused = params.get(2).is_some_and(|options| options["pause"] == "true");
                Ok(self.add_job(paused))
            }
            TELL_STATUS => {
                let gid = params.first().and_then(Value::as_str).unwrap_or_default();
                self.status(gid)
            }
            CHANGE_OPTION => {
                let Some(list) = params.get(1).and_then(|o| o["select-file"].as_str()) else {
                    return self.with_job(method, &params, |_| {});
                };
                let positions: Vec<usize> = list
                    .split(',')
                    .filter_map(|p| p.trim().parse().ok())
                    .collect();
                self.with_job(method, &params, |job| {
                    for (index, slot) in job.selected.iter_mut().enumerate() {
                        *slot = positions.contains(&(index + 1));
                    }
                })
                .map(|_| json!("OK"))
            }
            UNPAUSE => self.with_job(method, &params, |job| job.paused = false),
            REMOVE => self.with_job(method, &params, |job| job.removed = true),
            GET_VERSION => Ok(json!({"version": "1.37.0", "enabledFeatures": ["BitTorrent"]})),
            other => Err(ChannelError::Remote {
                method: other.to_string(),
                code: 1,
                message: "No such method".to_string(),
            }),
        }
    }
}
