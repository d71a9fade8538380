//! TOML-based configuration for the server.
//!
//! The file is optional.  When `--config` points at a file that does not
//! exist, the defaults below are used, and command-line flags override
//! whatever the file says.
//!
//! # What is TOML? (for beginners)
//!
//! TOML (Tom's Obvious Minimal Language) is a configuration file format designed
//! to be easy to read and write.  It looks similar to INI files but with more
//! data types.  Example:
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0"
//! port = 8081
//! keepalive_idle_secs = 1
//! write_timeout_ms = 10000
//!
//! [runtime]
//! worker_threads = 4
//!
//! [admin]
//! email = "admin@hotel.local"
//! password = "changeme"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  This lets a
//! config file list only the settings it wants to change.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hms_core::transport::{KeepaliveConfig, SessionLimits};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The bind address is not an IP address.
    #[error("invalid bind address {0:?}")]
    BindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub admin: AdminAccount,
}

/// Listener, keepalive and framing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// IP address to bind the listener to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port for the TLS listener.  `0` picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Idle seconds before the first TCP keepalive probe.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_idle_secs: u64,
    /// Seconds between unanswered keepalive probes.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    /// Upper bound on the TLS handshake of an accepted socket.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Largest inbound frame payload in bytes.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u32,
    /// How long one reply may take to write.  A client that stops reading
    /// is disconnected when this runs out.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Number of packet-handling workers.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

/// Administrator account created when the server starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminAccount {
    #[serde(default = "default_admin_email")]
    pub email: String,
    #[serde(default = "default_admin_password")]
    pub password: String,
    #[serde(default = "default_admin_first_name")]
    pub first_name: String,
    #[serde(default = "default_admin_last_name")]
    pub last_name: String,
    #[serde(default)]
    pub phone_number: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8081
}
fn default_keepalive_secs() -> u64 {
    1
}
fn default_handshake_timeout_ms() -> u64 {
    5000
}
fn default_max_frame_len() -> u32 {
    hms_core::protocol::MAX_FRAME_LEN
}
fn default_write_timeout_ms() -> u64 {
    hms_core::transport::DEFAULT_WRITE_TIMEOUT.as_millis() as u64
}
fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_admin_email() -> String {
    "admin@hotel.local".to_string()
}
fn default_admin_password() -> String {
    "changeme".to_string()
}
fn default_admin_first_name() -> String {
    "Hotel".to_string()
}
fn default_admin_last_name() -> String {
    "Admin".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            keepalive_idle_secs: default_keepalive_secs(),
            keepalive_interval_secs: default_keepalive_secs(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_frame_len: default_max_frame_len(),
            write_timeout_ms: default_write_timeout_ms(),
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

impl Default for AdminAccount {
    fn default() -> Self {
        Self {
            email: default_admin_email(),
            password: default_admin_password(),
            first_name: default_admin_first_name(),
            last_name: default_admin_last_name(),
            phone_number: String::new(),
        }
    }
}

impl NetworkConfig {
    /// Resolves the listener address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindAddress`] if `bind_address` is not an IP.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn keepalive(&self) -> KeepaliveConfig {
        KeepaliveConfig {
            idle: Duration::from_secs(self.keepalive_idle_secs),
            interval: Duration::from_secs(self.keepalive_interval_secs),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Framing and write limits applied to every client session.
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_frame_len: self.max_frame_len,
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `ServerConfig` from `path`, returning the defaults if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
