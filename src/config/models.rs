use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub submit: SubmitConfig,
    #[serde(default)]
    pub postprocess: PostProcessConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// External engine process settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Spawn and own the engine process; when false an already running engine is used
    #[serde(default = "default_true")]
    pub manage: bool,
    #[serde(default = "default_engine_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,
    #[serde(default = "default_ready_interval_ms")]
    pub ready_interval_ms: u64,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: u32,
    #[serde(default = "default_max_connection_per_server")]
    pub max_connection_per_server: u32,
    #[serde(default = "default_split")]
    pub split: u32,
    #[serde(default = "default_min_split_size")]
    pub min_split_size: ByteSize,
    #[serde(default = "default_dht_entry_point")]
    pub dht_entry_point: String,
    /// Extra raw arguments appended to the engine command line
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manage: true,
            binary: default_engine_binary(),
            rpc_port: default_rpc_port(),
            ready_attempts: default_ready_attempts(),
            ready_interval_ms: default_ready_interval_ms(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            max_connection_per_server: default_max_connection_per_server(),
            split: default_split(),
            min_split_size: default_min_split_size(),
            dht_entry_point: default_dht_entry_point(),
            extra_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_engine_binary() -> PathBuf {
    PathBuf::from("aria2c")
}

fn default_rpc_port() -> u16 {
    6800
}

fn default_ready_attempts() -> u32 {
    30
}

fn default_ready_interval_ms() -> u64 {
    1000
}

fn default_max_concurrent_downloads() -> u32 {
    3
}

fn default_max_connection_per_server() -> u32 {
    16
}

fn default_split() -> u32 {
    16
}

fn default_min_split_size() -> ByteSize {
    ByteSize(1024 * 1024)
}

fn default_dht_entry_point() -> String {
    "dht.libtorrent.org:25401".to_string()
}

/// Control channel settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    /// Overrides the endpoint derived from `engine.rpc_port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

/// Session polling and timeout settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Wall-clock ceiling measured from session start
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_metadata_wait_ms")]
    pub metadata_wait_ms: u64,
    #[serde(default = "default_metadata_poll_interval_ms")]
    pub metadata_poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            timeout_secs: default_timeout_secs(),
            metadata_wait_ms: default_metadata_wait_ms(),
            metadata_poll_interval_ms: default_metadata_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_progress_interval_ms() -> u64 {
    5000
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_metadata_wait_ms() -> u64 {
    15_000
}

fn default_metadata_poll_interval_ms() -> u64 {
    1000
}

/// Filesystem layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("completed")
}

/// Options attached to submitted jobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitConfig {
    /// Fallback trackers appended to magnet jobs
    #[serde(default = "default_trackers")]
    pub trackers: Vec<String>,
    #[serde(default = "default_tracker_timeout_secs")]
    pub tracker_timeout_secs: u64,
    #[serde(default = "default_max_upload_limit")]
    pub max_upload_limit: String,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            trackers: default_trackers(),
            tracker_timeout_secs: default_tracker_timeout_secs(),
            max_upload_limit: default_max_upload_limit(),
        }
    }
}

fn default_trackers() -> Vec<String> {
    [
        "udp://tracker.opentrackr.org:1337",
        "udp://open.stealth.si:80",
        "udp://tracker.torrent.eu.org:451",
        "https://tracker.foreverpirates.co:443/announce",
        "http://tracker.openbittorrent.com:80/announce",
        "wss://tracker.btorrent.xyz",
        "wss://tracker.openwebtorrent.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tracker_timeout_secs() -> u64 {
    10
}

fn default_max_upload_limit() -> String {
    "1K".to_string()
}

/// Subtitle extraction and relocation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostProcessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_media_tool")]
    pub media_tool: PathBuf,
    /// Language tags tried in order
    #[serde(default = "default_subtitle_languages")]
    pub subtitle_languages: Vec<String>,
    #[serde(default = "default_min_subtitle_bytes")]
    pub min_subtitle_bytes: ByteSize,
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            media_tool: default_media_tool(),
            subtitle_languages: default_subtitle_languages(),
            min_subtitle_bytes: default_min_subtitle_bytes(),
            tool_timeout_ms: default_tool_timeout_ms(),
        }
    }
}

fn default_media_tool() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_subtitle_languages() -> Vec<String> {
    ["fre", "fra", "fr", "french"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_subtitle_bytes() -> ByteSize {
    ByteSize(100)
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// JSON-RPC endpoint, either explicit or `http://localhost:<port>/jsonrpc`
    pub fn rpc_url(&self) -> String {
        self.rpc
            .url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/jsonrpc", self.engine.rpc_port))
    }
}
