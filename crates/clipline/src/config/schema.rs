use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::queue::DEFAULT_QUEUE_NAME;
use crate::secrets::{expand_home, resolve_secret_optional, SecretError};
use crate::stages::fileio::DEFAULT_ENDPOINT;
use crate::stages::openai::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_TRANSCRIPTION_MODEL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

fn default_database_path() -> String {
    "data/clipline.db".to_string()
}

impl Config {
    /// Where the queue table lives: its own file if configured, otherwise
    /// the status database.
    pub fn queue_path(&self) -> PathBuf {
        PathBuf::from(self.queue.path.as_deref().unwrap_or(&self.database_path))
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_visibility_timeout_secs() -> u64 {
    3600
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: None,
            name: default_queue_name(),
            poll_interval_ms: default_poll_interval_ms(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Consumer tag. Must be unique among workers sharing a queue.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    #[serde(default = "default_work_directory")]
    pub work_directory: String,
    /// Port for the liveness endpoint. Unset means `$PORT`, and no endpoint
    /// when that is unset too.
    #[serde(default)]
    pub health_port: Option<u16>,
}

fn default_consumer_name() -> String {
    "worker-1".to_string()
}

fn default_work_directory() -> String {
    "temp".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_name: default_consumer_name(),
            work_directory: default_work_directory(),
            health_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,
    #[serde(default = "default_stage_secs")]
    pub transcode_secs: u64,
    #[serde(default = "default_stage_secs")]
    pub analyze_secs: u64,
    #[serde(default = "default_stage_secs")]
    pub cut_secs: u64,
    #[serde(default = "default_stage_secs")]
    pub publish_secs: u64,
}

fn default_fetch_secs() -> u64 {
    600
}

fn default_stage_secs() -> u64 {
    300
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_secs(),
            transcode_secs: default_stage_secs(),
            analyze_secs: default_stage_secs(),
            cut_secs: default_stage_secs(),
            publish_secs: default_stage_secs(),
        }
    }
}

impl TimeoutsConfig {
    /// Worst-case wall time of one pipeline run.
    pub fn total_secs(&self) -> u64 {
        self.fetch_secs
            .saturating_add(self.transcode_secs)
            .saturating_add(self.analyze_secs)
            .saturating_add(self.cut_secs)
            .saturating_add(self.publish_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default)]
    pub cookies_file: Option<String>,
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

impl ToolsConfig {
    /// `cookies_file` with a leading `~` expanded.
    pub fn cookies_path(&self) -> Option<PathBuf> {
        self.cookies_file
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(expand_home)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: default_yt_dlp(),
            ffmpeg: default_ffmpeg(),
            cookies_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_true() -> bool {
    true
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_transcription_model() -> String {
    DEFAULT_TRANSCRIPTION_MODEL.to_string()
}

fn default_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            api_key_file: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            transcription_model: default_transcription_model(),
            model: default_model(),
        }
    }
}

impl AnalysisConfig {
    /// The API key if analysis is enabled and a key resolves. `None` means
    /// the pipeline runs with the fallback segment.
    pub fn resolve_api_key(&self) -> Result<Option<SecretString>, SecretError> {
        if !self.enabled {
            return Ok(None);
        }
        resolve_secret_optional(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}
