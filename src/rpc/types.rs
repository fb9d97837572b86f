//! Wire types for the engine's JSON-RPC protocol

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Request envelope
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub id: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.to_string(),
            id: Uuid::new_v4().to_string(),
            params,
        }
    }
}

/// Response envelope; exactly one of `result` / `error` is expected
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Engine-assigned job identifier (an aria2 GID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job status as reported by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    Removed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Subset of `tellStatus` output; absent keys take their defaults since callers select fields
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(default)]
    pub status: RemoteStatus,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub completed_length: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_length: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub download_speed: u64,
    #[serde(default)]
    pub files: Vec<EngineFile>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// One entry of the engine's file list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineFile {
    #[serde(default)]
    pub path: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub length: u64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub selected: bool,
}

/// aria2 encodes integers as decimal strings
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) if s.is_empty() => Ok(0),
        Raw::Text(s) => s.parse().map_err(de::Error::custom),
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Flag(b) => Ok(b),
        Raw::Text(s) => match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(de::Error::custom(format!("invalid boolean '{other}'"))),
        },
    }
}
