//! Client configuration management.
//!
//! Handles loading, saving, and accessing the client configuration: the hub
//! endpoint, bearer token, reconnection policy, heartbeat interval, and
//! logging. Configuration is persisted as TOML on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{ChatError, ChatResult};
use crate::platform::Platform;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hub connection settings.
    #[serde(default)]
    pub hub: HubConfig,

    /// Automatic reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectSettings,

    /// Application heartbeat settings.
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default identity used by the CLI.
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Hub connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Chat server base URL (e.g., "https://chat.example.com").
    #[serde(default)]
    pub base_url: String,

    /// Explicit hub URL. Overrides `base_url` + `/chathub` when set.
    #[serde(default)]
    pub hub_url: Option<String>,

    /// Bearer token attached when no token is passed to `initialize`.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Extra headers sent with the WebSocket upgrade request.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,

    /// Limit on connect + handshake in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Server silence in milliseconds after which the connection is considered lost.
    #[serde(default = "default_server_timeout")]
    pub server_timeout_ms: u64,

    /// Interval in milliseconds between protocol pings sent to the server.
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_ms: u64,
}

/// Reconnection policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    /// Whether a dropped connection is retried at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Cap for the exponential backoff in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Retries before the connection is declared lost (0 = unlimited).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Jitter factor (0.0 to 1.0) applied to each delay.
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

/// Heartbeat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    /// Seconds between `Ping` invocations.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Identity settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Username sent with `JoinChannel` and `SendMessage`.
    #[serde(default)]
    pub username: String,
}

// Default value functions for serde

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_server_timeout() -> u64 {
    constants::DEFAULT_SERVER_TIMEOUT_MS
}

fn default_keep_alive_interval() -> u64 {
    constants::DEFAULT_KEEP_ALIVE_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    constants::DEFAULT_RECONNECT_ATTEMPTS
}

fn default_jitter() -> f64 {
    0.3
}

fn default_heartbeat_interval() -> u64 {
    constants::HEARTBEAT_INTERVAL_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            hub_url: None,
            access_token: None,
            custom_headers: HashMap::new(),
            connect_timeout_ms: default_connect_timeout(),
            server_timeout_ms: default_server_timeout(),
            keep_alive_interval_ms: default_keep_alive_interval(),
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            jitter_factor: default_jitter(),
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl HubConfig {
    /// Resolve the hub endpoint.
    ///
    /// A non-empty `hub_url` wins; otherwise the endpoint is the sanitized
    /// `base_url` followed by `/chathub`.
    pub fn resolve_endpoint(&self) -> ChatResult<String> {
        if let Some(url) = self.hub_url.as_deref() {
            let url = url.trim();
            if !url.is_empty() {
                return Ok(url.to_string());
            }
        }

        let base = sanitize_base_url(&self.base_url);
        if base.is_empty() {
            return Err(ChatError::MissingConfig("hub.base_url or hub.hub_url".into()));
        }
        Ok(format!("{base}{}", constants::HUB_PATH))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}

impl HeartbeatSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Sanitize and normalize a user-entered base URL.
///
/// Strips whitespace, surrounding quotes and trailing slashes, and adds
/// `http://` when no scheme is present.
pub fn sanitize_base_url(address: &str) -> String {
    let trimmed = address.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let has_scheme = ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| trimmed.starts_with(scheme));
    let with_scheme = if has_scheme {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    with_scheme.trim_end_matches('/').to_string()
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> ChatResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> ChatResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> ChatResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ChatError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> ChatResult<PathBuf> {
        Ok(Platform::from_env().config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> ChatResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Platform::from_env().log_dir()
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether a hub endpoint can be resolved.
    pub fn is_hub_configured(&self) -> bool {
        self.hub.resolve_endpoint().is_ok()
    }
}

/// Thread-safe configuration holder for shared access.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Clone the current configuration out of the handle.
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.read().await.clone()
    }
}
