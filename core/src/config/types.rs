use serde::{Deserialize, Serialize};

use crate::storage::{DEFAULT_FLUSH_CONCURRENCY, DEFAULT_FLUSH_THRESHOLD};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "collector_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root run directory. Expected to be clean at the start of a run.
    #[serde(default = "default_storage_directory")]
    pub directory: String,

    /// Buffered records per `(step, kind)` that trigger an automatic flush.
    /// Also the implicit upload batch size.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Maximum concurrent batch file writes.
    #[serde(default = "default_flush_concurrency")]
    pub flush_concurrency: usize,
}

fn default_storage_directory() -> String {
    "./.collector".to_string()
}

fn default_flush_threshold() -> usize {
    DEFAULT_FLUSH_THRESHOLD
}

fn default_flush_concurrency() -> usize {
    DEFAULT_FLUSH_CONCURRENCY
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_storage_directory(),
            flush_threshold: default_flush_threshold(),
            flush_concurrency: default_flush_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Show a progress bar of step completion on stderr.
    #[serde(default)]
    pub progress_bar: bool,

    /// Step ids disabled in addition to the ones the steps declare.
    #[serde(default)]
    pub disabled_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Sent as the account header when non-empty.
    #[serde(default)]
    pub account_id: String,

    #[serde(default = "default_sync_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum concurrent batch uploads.
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_sync_base_url() -> String {
    "https://api.us.jupiterone.io".to_string()
}

fn default_sync_timeout_ms() -> u64 {
    30_000
}

fn default_upload_concurrency() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_poll_timeout_ms() -> u64 {
    300_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_sync_base_url(),
            api_key: String::new(),
            account_id: String::new(),
            timeout_ms: default_sync_timeout_ms(),
            upload_concurrency: default_upload_concurrency(),
            retry: RetryConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Fixed-delay retry for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}
