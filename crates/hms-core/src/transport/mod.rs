//! Transport: TLS setup, TCP keepalive and the per-connection session.

pub mod keepalive;
pub mod session;
pub mod tls;

pub use keepalive::{apply_keepalive, KeepaliveConfig};
pub use session::{
    Session, SessionLimits, SessionStatus, TransportError, DEFAULT_WRITE_TIMEOUT,
};
pub use tls::{
    client_tls_config, server_name, server_tls_config, ServerCredential, TlsAcceptor,
    TlsConnector, TlsError,
};
