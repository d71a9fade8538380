//! Server session manager: TLS listener, per-client sessions and dispatch.
//!
//! # Life of a connection
//!
//! ```text
//! accept ─► keepalive ─► TLS handshake ─► register ServerSession ─► reader task
//!                                                                      │
//!                     frame payload ──► worker pool job ◄──────────────┘
//!                                          │
//!                       decode ─► lock ClientState ─► PacketHandler ─► reply
//! ```
//!
//! A socket whose keepalive setup or handshake fails is dropped before a
//! session exists.  Each session has one persistent reader task; the actual
//! packet handling runs on the shared [`WorkerPool`], so a slow request from
//! one client never stalls the readers of the others.
//!
//! # Locking
//!
//! The session map is guarded by a synchronous mutex that is never held
//! across an `.await`.  A session's [`ClientState`] has its own async mutex,
//! always taken after the map lock has been released.
//!
//! # Removal
//!
//! A session leaves the map exactly once, guarded by its
//! `is_being_removed` flag, whichever of the reader task or an explicit
//! [`Server::disconnect`] gets there first.  Removal emits
//! [`ServerEvent::ClientDisconnected`].  A new connection that reuses the
//! address and port of a live one replaces it: the old session is removed
//! and disconnected before the new one is announced.
//!
//! Lifecycle events go through an unbounded channel.  There are at most two
//! per connection, and a lagging consumer must not lose them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hms_core::protocol::frame::{FrameError, FrameEvent, FrameReader};
use hms_core::protocol::{next_request_id, UnknownPacket};
use hms_core::transport::{
    apply_keepalive, server_tls_config, KeepaliveConfig, ServerCredential, SessionLimits,
    TlsAcceptor, TlsError,
};
use hms_core::{decode_packet, Packet, PacketRegistry, PoolError, Session, ShutdownMode, WorkerPool};
use thiserror::Error;
use tokio::io::ReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::serve_requests::PacketHandler;
use crate::domain::client_state::ClientState;
use crate::infrastructure::credential::{default_hosts, generate_self_signed};
use crate::infrastructure::storage::config::{ConfigError, ServerConfig};

/// Identifies a connected client: its remote address and port.
pub type ConnectionKey = SocketAddr;

type TlsStream = tokio_rustls::server::TlsStream<TcpStream>;

/// Error type for server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to generate server certificate: {0}")]
    Credential(#[from] rcgen::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("server is already running or has been stopped")]
    NotRunnable,
}

/// Connection lifecycle notifications for the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ClientConnected(ConnectionKey),
    ClientDisconnected(ConnectionKey),
}

/// One registered client connection.
pub struct ServerSession {
    key: ConnectionKey,
    id: Uuid,
    transport: Arc<Session<TlsStream>>,
    state: tokio::sync::Mutex<ClientState>,
    is_being_removed: AtomicBool,
}

impl ServerSession {
    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns a copy of the client's current login state.
    pub async fn client_state(&self) -> ClientState {
        self.state.lock().await.clone()
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct Shared {
    sessions: Mutex<HashMap<ConnectionKey, Arc<ServerSession>>>,
    handler: Arc<dyn PacketHandler>,
    registry: PacketRegistry,
    pool: WorkerPool,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl Shared {
    fn sessions(&self) -> MutexGuard<'_, HashMap<ConnectionKey, Arc<ServerSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &ConnectionKey) -> Option<Arc<ServerSession>> {
        self.sessions().get(key).cloned()
    }

    fn snapshot(&self) -> Vec<Arc<ServerSession>> {
        self.sessions().values().cloned().collect()
    }

    fn emit(&self, event: ServerEvent) {
        if let Err(e) = self.events.send(event) {
            debug!("server event not delivered: {e}");
        }
    }

    async fn register(
        &self,
        stream: TlsStream,
        peer: SocketAddr,
        limits: SessionLimits,
    ) -> (Arc<ServerSession>, FrameReader<ReadHalf<TlsStream>>) {
        let (transport, reader) = Session::with_limits(stream, peer, limits);
        let session = Arc::new(ServerSession {
            key: peer,
            id: Uuid::new_v4(),
            transport,
            state: tokio::sync::Mutex::new(ClientState::default()),
            is_being_removed: AtomicBool::new(false),
        });
        let replaced = self.sessions().insert(peer, Arc::clone(&session));
        if let Some(old) = replaced {
            warn!(peer = %peer, session_id = %old.id, "address reused, replacing stale session");
            self.remove(&old);
            old.transport.disconnect().await;
        }
        info!(peer = %peer, session_id = %session.id, "client connected");
        self.emit(ServerEvent::ClientConnected(peer));
        (session, reader)
    }

    /// Registers a handshaken connection unless the server began stopping.
    ///
    /// `stop` may snapshot the session map between the caller's own shutdown
    /// check and the insert, so the flag is read again once registered.
    async fn admit(
        &self,
        stream: TlsStream,
        peer: SocketAddr,
        limits: SessionLimits,
        shutdown: &watch::Receiver<bool>,
    ) -> Option<(Arc<ServerSession>, FrameReader<ReadHalf<TlsStream>>)> {
        let (session, reader) = self.register(stream, peer, limits).await;
        if *shutdown.borrow() {
            debug!(peer = %peer, "server stopping, closing new session");
            session.transport.disconnect().await;
            self.remove(&session);
            return None;
        }
        Some((session, reader))
    }

    fn remove(&self, session: &ServerSession) {
        if session.is_being_removed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut sessions = self.sessions();
            if sessions.get(&session.key).is_some_and(|s| s.id == session.id) {
                sessions.remove(&session.key);
            }
        }
        info!(peer = %session.key, session_id = %session.id, "client disconnected");
        self.emit(ServerEvent::ClientDisconnected(session.key));
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// TLS server owning every client session.
pub struct Server {
    shared: Arc<Shared>,
    listener: Mutex<Option<TcpListener>>,
    acceptor: TlsAcceptor,
    local_addr: SocketAddr,
    keepalive: KeepaliveConfig,
    handshake_timeout: Duration,
    limits: SessionLimits,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl Server {
    /// Generates the server credential, binds the listener and starts the pool.
    ///
    /// # Errors
    ///
    /// Any failure here leaves nothing running and should end the process.
    pub async fn bind(
        config: &ServerConfig,
        handler: Arc<dyn PacketHandler>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), ServerError> {
        let credential = generate_self_signed(&default_hosts())?;
        Self::bind_with_credential(config, handler, &credential).await
    }

    /// Like [`Server::bind`] but with a caller-supplied credential.
    pub async fn bind_with_credential(
        config: &ServerConfig,
        handler: Arc<dyn PacketHandler>,
        credential: &ServerCredential,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), ServerError> {
        let acceptor = TlsAcceptor::from(server_tls_config(credential)?);
        let addr = config.network.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::BindFailed { addr, source })?;
        let pool = WorkerPool::new(config.runtime.worker_threads.max(1))?;

        let (events, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        info!(addr = %local_addr, workers = pool.thread_count(), "server listening");

        let server = Self {
            shared: Arc::new(Shared {
                sessions: Mutex::new(HashMap::new()),
                handler,
                registry: PacketRegistry::standard(),
                pool,
                events,
            }),
            listener: Mutex::new(Some(listener)),
            acceptor,
            local_addr,
            keepalive: config.network.keepalive(),
            handshake_timeout: config.network.handshake_timeout(),
            limits: config.network.session_limits(),
            shutdown,
            stopped: AtomicBool::new(false),
        };
        Ok((server, events_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until [`Server::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotRunnable`] if called twice or after `stop`.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ServerError::NotRunnable)?;
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(ServerError::NotRunnable);
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((tcp, peer)) => self.spawn_handshake(tcp, peer),
                    Err(e) => {
                        warn!("accept failed: {e}");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }
        info!("accept loop stopped");
        Ok(())
    }

    fn spawn_handshake(&self, tcp: TcpStream, peer: SocketAddr) {
        if let Err(e) = apply_keepalive(&tcp, &self.keepalive) {
            warn!(peer = %peer, "keepalive setup failed, dropping connection: {e}");
            return;
        }
        let acceptor = self.acceptor.clone();
        let shared = Arc::clone(&self.shared);
        let timeout = self.handshake_timeout;
        let limits = self.limits;
        let shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let stream = match tokio::time::timeout(timeout, acceptor.accept(tcp)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(peer = %peer, "TLS handshake failed: {e}");
                    return;
                }
                Err(_) => {
                    warn!(peer = %peer, "TLS handshake timed out");
                    return;
                }
            };
            if *shutdown.borrow() {
                debug!(peer = %peer, "server stopping, dropping new connection");
                return;
            }
            if let Some((session, reader)) = shared.admit(stream, peer, limits, &shutdown).await {
                read_loop(shared, session, reader).await;
            }
        });
    }

    /// Sends `packet` to one client.  Returns `false` if it is unknown or the send failed.
    pub async fn send_to(&self, key: ConnectionKey, packet: &Packet) -> bool {
        match self.shared.lookup(&key) {
            Some(session) => session.transport.send_packet(packet).await,
            None => false,
        }
    }

    /// Sends `packet` to every client.  Returns how many sends succeeded.
    pub async fn broadcast(&self, packet: &Packet) -> usize {
        let mut delivered = 0;
        for session in self.shared.snapshot() {
            if session.transport.send_packet(packet).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Disconnects one client.  Returns `false` if no such client is connected.
    pub async fn disconnect(&self, key: ConnectionKey) -> bool {
        let Some(session) = self.shared.lookup(&key) else {
            return false;
        };
        session.transport.disconnect().await;
        self.shared.remove(&session);
        true
    }

    pub async fn disconnect_all(&self) {
        for session in self.shared.snapshot() {
            session.transport.disconnect().await;
            self.shared.remove(&session);
        }
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions().len()
    }

    pub fn connected_keys(&self) -> Vec<ConnectionKey> {
        let mut keys: Vec<_> = self.shared.sessions().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Returns the session registered under `key`.
    pub fn session(&self, key: ConnectionKey) -> Option<Arc<ServerSession>> {
        self.shared.lookup(&key)
    }

    /// Stops accepting, disconnects every client and shuts the pool down.
    pub async fn stop(&self, mode: ShutdownMode) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(?mode, "server stopping");
        self.shutdown.send_replace(true);
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.disconnect_all().await;
        self.shared.pool.shutdown(mode).await;
        info!("server stopped");
    }
}

// ── Per-session tasks ─────────────────────────────────────────────────────────

async fn read_loop(
    shared: Arc<Shared>,
    session: Arc<ServerSession>,
    mut reader: FrameReader<ReadHalf<TlsStream>>,
) {
    let peer = session.key;
    loop {
        let event = tokio::select! {
            _ = session.transport.closed() => break,
            event = reader.read_frame() => event,
        };
        match event {
            Ok(FrameEvent::Payload(payload)) => {
                let job = handle_payload(Arc::clone(&shared), Arc::clone(&session), payload);
                if let Err(e) = shared.pool.submit(job) {
                    debug!(peer = %peer, "dropping frame: {e}");
                    break;
                }
            }
            Ok(FrameEvent::Skipped(reason)) => {
                warn!(peer = %peer, ?reason, "discarded frame");
            }
            Err(FrameError::Closed) => {
                debug!(peer = %peer, "peer closed the connection");
                break;
            }
            Err(e) => {
                warn!(peer = %peer, "read failed: {e}");
                break;
            }
        }
    }
    session.transport.disconnect().await;
    shared.remove(&session);
}

async fn handle_payload(shared: Arc<Shared>, session: Arc<ServerSession>, payload: Vec<u8>) {
    let peer = session.key;
    if !session.transport.is_connected() {
        debug!(peer = %peer, "session closed, dropping queued packet");
        return;
    }
    let packet = match decode_packet(&payload, &shared.registry) {
        Ok(packet) if !packet.is_unknown() => packet,
        Ok(packet) => {
            warn!(peer = %peer, "unrecognised packet type, disconnecting");
            reject_bad_packet(&session, packet.request_id()).await;
            return;
        }
        Err(e) => {
            warn!(peer = %peer, "bad packet, disconnecting: {e}");
            reject_bad_packet(&session, next_request_id()).await;
            return;
        }
    };

    debug!(peer = %peer, packet = packet.name(), request_id = packet.request_id(), "handling packet");
    let reply = {
        let mut state = session.state.lock().await;
        shared.handler.handle(packet, &mut state).await
    };
    if let Some(reply) = reply {
        if !session.transport.send_packet(&reply).await {
            error!(peer = %peer, request_id = reply.request_id(), "failed to send reply");
        }
    }
}

async fn reject_bad_packet(session: &ServerSession, request_id: u64) {
    let reply = Packet::from(UnknownPacket { request_id });
    session.transport.send_packet(&reply).await;
    session.transport.disconnect().await;
}
