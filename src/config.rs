/*!
 * Configuration support for the MRF ingestion core
 *
 * Provides runtime knobs for streaming, retry, and orchestration
 * behavior, loadable from a TOML file or environment variables, with a
 * process-wide global for embedders that configure once.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_LOGS_DIR, DEFAULT_POOL_MAX_CONNECTIONS, DEFAULT_READ_BUFFER_SIZE,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MS,
};

/// Global configuration for the MRF library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrfConfig {
    /// Read-ahead buffer for local and plain remote streams, in bytes
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Remote open attempts before a connection error surfaces
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Sleep between remote open attempts, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// HTTP connection pool size for high fan-out batches
    #[serde(default = "default_pool_max_connections")]
    pub pool_max_connections: usize,

    /// Worker count for batch runs (None = available units minus one)
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Directory per-job log files are written under
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Whether to show the batch progress bar
    #[serde(default = "default_enable_progress_bar")]
    pub enable_progress_bar: bool,
}

impl Default for MrfConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            pool_max_connections: default_pool_max_connections(),
            worker_threads: None,
            logs_dir: default_logs_dir(),
            enable_progress_bar: default_enable_progress_bar(),
        }
    }
}

// Default value functions for serde
fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

fn default_pool_max_connections() -> usize {
    DEFAULT_POOL_MAX_CONNECTIONS
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOGS_DIR)
}

fn default_enable_progress_bar() -> bool {
    true
}

impl MrfConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// The retry backoff as a [`Duration`]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - `MRF_READ_BUFFER_SIZE`: bytes
    /// - `MRF_RETRY_ATTEMPTS`: count
    /// - `MRF_RETRY_BACKOFF_MS`: milliseconds
    /// - `MRF_POOL_MAX_CONNECTIONS`: count
    /// - `MRF_WORKER_THREADS`: count or "auto"
    /// - `MRF_LOGS_DIR`: directory path
    /// - `MRF_PROGRESS_BAR`: "true" or "false"
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MRF_READ_BUFFER_SIZE") {
            if let Ok(bytes) = val.parse() {
                config.read_buffer_size = bytes;
            }
        }

        if let Ok(val) = std::env::var("MRF_RETRY_ATTEMPTS") {
            if let Ok(attempts) = val.parse() {
                config.retry_attempts = attempts;
            }
        }

        if let Ok(val) = std::env::var("MRF_RETRY_BACKOFF_MS") {
            if let Ok(ms) = val.parse() {
                config.retry_backoff_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("MRF_POOL_MAX_CONNECTIONS") {
            if let Ok(connections) = val.parse() {
                config.pool_max_connections = connections;
            }
        }

        if let Ok(val) = std::env::var("MRF_WORKER_THREADS") {
            config.worker_threads = match val.to_lowercase().as_str() {
                "auto" | "0" => None,
                num => num.parse().ok(),
            };
        }

        if let Ok(val) = std::env::var("MRF_LOGS_DIR") {
            config.logs_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("MRF_PROGRESS_BAR") {
            config.enable_progress_bar = val.to_lowercase() == "true";
        }

        config
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents).map_err(|e| crate::MrfError::Configuration {
            message: format!("failed to parse config file: {}", e),
            suggestion: Some("Check that the file is valid TOML".to_string()),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| crate::MrfError::Configuration {
            message: format!("failed to serialize config: {}", e),
            suggestion: None,
        })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/mrf/config.toml` on Unix-like systems or
    /// `%APPDATA%\mrf\config.toml` on Windows
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mrf")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from the default location, environment, or
    /// defaults
    ///
    /// Priority order:
    /// 1. Default config file (if it exists)
    /// 2. Environment variables
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Some(config_path) = Self::default_config_path() {
            if config_path.exists() {
                if let Ok(config) = Self::from_file(&config_path) {
                    return config;
                }
            }
        }

        Self::from_env()
    }
}

// Global configuration support
use std::sync::RwLock;

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<Option<MrfConfig>> = RwLock::new(None);
}

/// Set the global configuration
pub fn set_global_config(config: MrfConfig) {
    *GLOBAL_CONFIG.write().unwrap() = Some(config);
}

/// Get the global configuration (or load one if not set)
pub fn global_config() -> MrfConfig {
    GLOBAL_CONFIG
        .read()
        .unwrap()
        .as_ref()
        .cloned()
        .unwrap_or_else(MrfConfig::load)
}

/// Clear the global configuration
pub fn clear_global_config() {
    *GLOBAL_CONFIG.write().unwrap() = None;
}

/// Builder for customizing configuration
pub struct ConfigBuilder {
    config: MrfConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Start building a new configuration
    pub fn new() -> Self {
        Self {
            config: MrfConfig::default(),
        }
    }

    /// Set the read-ahead buffer size
    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.config.read_buffer_size = bytes;
        self
    }

    /// Set the remote open attempt count
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    /// Set the sleep between remote open attempts
    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Set the HTTP connection pool size
    pub fn pool_max_connections(mut self, connections: usize) -> Self {
        self.config.pool_max_connections = connections;
        self
    }

    /// Set the batch worker count
    pub fn worker_threads(mut self, threads: Option<usize>) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Set the per-job logs directory
    pub fn logs_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.logs_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set progress bar enabled
    pub fn progress_bar(mut self, enabled: bool) -> Self {
        self.config.enable_progress_bar = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> MrfConfig {
        self.config
    }
}
