//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main Freesail configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Streaming parser settings.
    #[serde(default)]
    pub codec: CodecConfig,

    /// Client transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind mode.
    #[serde(default)]
    pub bind: BindMode,

    /// Port number.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS for browser clients.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Maximum concurrently connected client sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Directory of catalog files preloaded into the catalog store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogs_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::default(),
            port: default_port(),
            cors: true,
            max_connections: default_max_connections(),
            catalogs_dir: None,
        }
    }
}

fn default_port() -> u16 {
    18790
}

fn default_max_connections() -> usize {
    256
}

/// Bind mode for the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to loopback only (127.0.0.1).
    #[default]
    Loopback,

    /// Bind to all interfaces.
    Lan,
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session is evicted, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Interval of the stale-session sweep, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Interval of keep-alive frames on client streams, in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            keepalive_secs: default_keepalive(),
        }
    }
}

impl SessionConfig {
    /// Idle timeout as a duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Keep-alive interval as a duration.
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

fn default_idle_timeout() -> u64 {
    30 * 60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_keepalive() -> u64 {
    15
}

/// Streaming parser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Ceiling on buffered, not yet parsed bytes.
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: default_max_buffer_bytes(),
        }
    }
}

fn default_max_buffer_bytes() -> usize {
    1024 * 1024
}

/// Client transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Gateway base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Reconnect automatically after a dropped connection.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Backoff floor in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier applied after each scheduled reconnect.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Maximum messages held while offline.
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,

    /// Keep-alive ping interval in milliseconds (0 disables pings).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Catalog ids the client declares support for on connect.
    #[serde(default)]
    pub catalogs: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auto_reconnect: true,
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_factor: default_backoff_factor(),
            max_queue: default_max_queue(),
            ping_interval_ms: default_ping_interval(),
            catalogs: Vec::new(),
        }
    }
}

fn default_base_url() -> String {
    format!("http://127.0.0.1:{}", default_port())
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_queue() -> usize {
    100
}

fn default_ping_interval() -> u64 {
    15_000
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn default_true() -> bool {
    true
}
