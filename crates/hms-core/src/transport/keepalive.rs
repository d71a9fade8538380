//! TCP keepalive for accepted and outgoing connections.

use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

/// Keepalive probe timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Idle time before the first probe.
    pub idle: Duration,
    /// Time between unanswered probes.
    pub interval: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(1),
            interval: Duration::from_secs(1),
        }
    }
}

/// Enables keepalive on `stream` with the given timing.
///
/// The probe interval is only applied on platforms that expose it.
pub fn apply_keepalive(stream: &TcpStream, config: &KeepaliveConfig) -> std::io::Result<()> {
    let params = TcpKeepalive::new().with_time(config.idle);
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    let params = params.with_interval(config.interval);
    SockRef::from(stream).set_tcp_keepalive(&params)
}
