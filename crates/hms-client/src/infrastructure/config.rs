//! TOML-based configuration for the client.
//!
//! Same rules as the server: the file is optional, a missing field takes its
//! default, and command-line flags override the file.
//!
//! ```toml
//! [server]
//! host = "hotel.example.lan"
//! port = 8081
//!
//! [requests]
//! timeout_ms = 5000
//! callback_ttl_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use hms_core::transport::{KeepaliveConfig, SessionLimits};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerEndpoint,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub requests: RequestConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Where the server listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerEndpoint {
    /// Host name or IP address.  Also used as the TLS server name.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Upper bound on TCP connect plus TLS handshake.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_idle_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    /// Largest inbound frame payload in bytes.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u32,
    /// How long one outbound frame may take to write before the
    /// connection is dropped.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Request correlation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestConfig {
    /// How long a synchronous request waits for its response.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long an unanswered asynchronous callback stays registered.
    #[serde(default = "default_callback_ttl_secs")]
    pub callback_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Number of inbound dispatch workers.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8081
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_keepalive_secs() -> u64 {
    1
}
fn default_max_frame_len() -> u32 {
    hms_core::protocol::MAX_FRAME_LEN
}
fn default_write_timeout_ms() -> u64 {
    hms_core::transport::DEFAULT_WRITE_TIMEOUT.as_millis() as u64
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_callback_ttl_secs() -> u64 {
    hms_core::correlation::DEFAULT_CALLBACK_TTL.as_secs()
}
fn default_worker_threads() -> usize {
    2
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            keepalive_idle_secs: default_keepalive_secs(),
            keepalive_interval_secs: default_keepalive_secs(),
            max_frame_len: default_max_frame_len(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            callback_ttl_secs: default_callback_ttl_secs(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

impl NetworkConfig {
    pub fn keepalive(&self) -> KeepaliveConfig {
        KeepaliveConfig {
            idle: Duration::from_secs(self.keepalive_idle_secs),
            interval: Duration::from_secs(self.keepalive_interval_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_frame_len: self.max_frame_len,
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn callback_ttl(&self) -> Duration {
        Duration::from_secs(self.callback_ttl_secs)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `ClientConfig` from `path`, returning the defaults if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
