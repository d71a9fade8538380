//! Client session manager: one TLS connection plus request correlation.
//!
//! # Life of a connection
//!
//! ```text
//! connect ─► keepalive ─► TLS handshake ─► Session + reader task
//!                                               │
//!                  frame payload ─► worker pool job (dispatch)
//!                                      │
//!          decode ─► Response? ─► PendingRequests::resolve ─► waiter / owner queue
//!                        │
//!                        └─► otherwise ClientEvent::PacketReceived
//! ```
//!
//! Inbound frames are decoded on the client's own [`WorkerPool`], never on
//! the reader task, so a slow consumer does not stall reading.
//!
//! # Bad packets
//!
//! A frame that does not decode, or decodes to the Unknown sentinel, is
//! logged and dropped.  The client stays connected and sends nothing back.
//!
//! # Disconnect
//!
//! Whoever notices first (the reader task on EOF or a read error, or the
//! caller through [`Client::disconnect`]) closes the transport, fails every
//! pending request and emits [`ClientEvent::Disconnected`].  That happens
//! exactly once.  Packet events are dropped when the consumer lags; the
//! disconnect event is never dropped, it waits for room in the channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hms_core::correlation::{OwnerQueueHandle, PendingRequests, Resolution};
use hms_core::protocol::frame::{FrameError, FrameEvent, FrameReader};
use hms_core::transport::{
    apply_keepalive, client_tls_config, server_name, TlsConnector, TlsError,
};
use hms_core::{
    decode_packet, Packet, PacketRegistry, PoolError, ResponsePacket, Session, ShutdownMode,
    WorkerPool,
};
use thiserror::Error;
use tokio::io::ReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::request_channel::{RequestChannel, RequestError};
use crate::infrastructure::config::ClientConfig;

type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Capacity of the event channel returned by [`Client::connect`].
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur while establishing the connection.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {addr} timed out")]
    ConnectTimeout { addr: String },

    #[error("keepalive setup failed: {0}")]
    Keepalive(#[source] std::io::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Notifications for the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A packet arrived that no pending request was waiting for.
    PacketReceived(Packet),
    /// The connection is gone.  Sent once.
    Disconnected,
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct Shared {
    transport: Arc<Session<TlsStream>>,
    pending: PendingRequests,
    registry: PacketRegistry,
    pool: WorkerPool,
    events: mpsc::Sender<ClientEvent>,
    disconnect_reported: AtomicBool,
}

impl Shared {
    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!("client event not delivered: {e}");
        }
    }

    fn emit_disconnected(&self) {
        match self.events.try_send(ClientEvent::Disconnected) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                // Queued behind the backlog; delivered once the consumer catches up.
                let events = self.events.clone();
                tokio::spawn(async move {
                    let _ = events.send(event).await;
                });
            }
        }
    }

    /// Drops the entry for `request_id` if the connection closed while it was
    /// being registered, since `fail_all` may already have run.
    fn still_connected(&self, request_id: u64) -> bool {
        if self.transport.is_connected() {
            return true;
        }
        self.pending.remove(request_id);
        false
    }

    async fn shut_down(&self) {
        self.transport.disconnect().await;
        if self.disconnect_reported.swap(true, Ordering::AcqRel) {
            return;
        }
        let failed = self.pending.fail_all();
        info!(peer = %self.transport.peer_addr(), failed, "disconnected from server");
        self.emit_disconnected();
        self.pool.shutdown(ShutdownMode::Drop).await;
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// A connected client.  Dropping it stops the reader task.
pub struct Client {
    shared: Arc<Shared>,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl Client {
    /// Connects to the configured server and starts reading.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] if the TCP connect, keepalive setup or TLS
    /// handshake fails, or does not finish within the connect timeout.
    pub async fn connect(
        config: &ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>), ClientError> {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let connector = TlsConnector::from(client_tls_config()?);
        let name = server_name(&config.server.host)?;
        let keepalive = config.network.keepalive();

        let establish = async {
            let tcp = TcpStream::connect(&addr)
                .await
                .map_err(|source| ClientError::ConnectFailed {
                    addr: addr.clone(),
                    source,
                })?;
            apply_keepalive(&tcp, &keepalive).map_err(ClientError::Keepalive)?;
            let peer = tcp.peer_addr().map_err(|source| ClientError::ConnectFailed {
                addr: addr.clone(),
                source,
            })?;
            let stream = connector
                .connect(name, tcp)
                .await
                .map_err(ClientError::Handshake)?;
            Ok::<(TlsStream, SocketAddr), ClientError>((stream, peer))
        };
        let (stream, peer) = tokio::time::timeout(config.network.connect_timeout(), establish)
            .await
            .map_err(|_| ClientError::ConnectTimeout { addr: addr.clone() })??;

        let pool = WorkerPool::new(config.runtime.worker_threads.max(1))?;
        let (transport, reader) =
            Session::with_limits(stream, peer, config.network.session_limits());
        let (events, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            transport,
            pending: PendingRequests::with_callback_ttl(config.requests.callback_ttl()),
            registry: PacketRegistry::standard(),
            pool,
            events,
            disconnect_reported: AtomicBool::new(false),
        });
        info!(peer = %peer, "connected to server");

        let reader = tokio::spawn(read_loop(Arc::clone(&shared), reader));
        let client = Self {
            shared,
            request_timeout: config.requests.timeout(),
            reader,
        };
        Ok((client, events_rx))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.transport.peer_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.transport.is_connected()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// Sends `packet` without registering for a reply.
    pub async fn send_packet(&self, packet: &Packet) -> bool {
        self.shared.transport.send_packet(packet).await
    }

    /// Sends `packet` and waits for the response with the same `request_id`.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Timeout`] if nothing arrived in time.  The pending
    ///   entry is removed, so a late reply matches nothing.
    /// - [`RequestError::SendFailed`] if the packet could not be written.
    /// - [`RequestError::Disconnected`] if the connection closed first.
    /// - [`RequestError::Duplicate`] if the id is already pending.
    pub async fn request(&self, packet: Packet) -> Result<ResponsePacket, RequestError> {
        if !self.is_connected() {
            return Err(RequestError::Disconnected);
        }
        let request_id = packet.request_id();
        let waiter = self.shared.pending.register_waiter(request_id)?;
        if !self.shared.still_connected(request_id) {
            return Err(RequestError::Disconnected);
        }

        if !self.shared.transport.send_packet(&packet).await {
            self.shared.pending.remove(request_id);
            return Err(if self.is_connected() {
                RequestError::SendFailed
            } else {
                RequestError::Disconnected
            });
        }

        match tokio::time::timeout(self.request_timeout, waiter).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RequestError::Disconnected),
            Err(_) => {
                self.shared.pending.remove(request_id);
                warn!(
                    request_id,
                    packet = packet.name(),
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "request timed out"
                );
                Err(RequestError::Timeout(self.request_timeout))
            }
        }
    }

    /// Sends `packet` and returns at once.
    ///
    /// When the response arrives, `callback` is queued on `owner` and runs
    /// the next time the owner drains its queue.  Returns `false` if the
    /// packet was not sent; the callback is then dropped unrun.
    pub async fn request_async<F>(&self, packet: Packet, owner: &OwnerQueueHandle, callback: F) -> bool
    where
        F: FnOnce(ResponsePacket) + Send + 'static,
    {
        if !self.is_connected() {
            return false;
        }
        let request_id = packet.request_id();
        if let Err(e) = self
            .shared
            .pending
            .register_callback(request_id, owner, Box::new(callback))
        {
            warn!(request_id, "async request not registered: {e}");
            return false;
        }
        if !self.shared.still_connected(request_id) {
            return false;
        }
        if self.shared.transport.send_packet(&packet).await {
            true
        } else {
            self.shared.pending.remove(request_id);
            false
        }
    }

    /// Closes the connection.  Returns `false` if it was already closed.
    pub async fn disconnect(&self) -> bool {
        let was_connected = self.is_connected();
        self.shared.shut_down().await;
        was_connected
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.peer_addr())
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

#[async_trait]
impl RequestChannel for Client {
    async fn request(&self, packet: Packet) -> Result<ResponsePacket, RequestError> {
        Client::request(self, packet).await
    }

    async fn notify(&self, packet: Packet) -> bool {
        self.send_packet(&packet).await
    }
}

// ── Reader and dispatch ───────────────────────────────────────────────────────

async fn read_loop(shared: Arc<Shared>, mut reader: FrameReader<ReadHalf<TlsStream>>) {
    let peer = shared.transport.peer_addr();
    loop {
        let event = tokio::select! {
            _ = shared.transport.closed() => break,
            event = reader.read_frame() => event,
        };
        match event {
            Ok(FrameEvent::Payload(payload)) => {
                if let Err(e) = shared.pool.submit(dispatch(Arc::clone(&shared), payload)) {
                    debug!(peer = %peer, "dropping frame: {e}");
                    break;
                }
            }
            Ok(FrameEvent::Skipped(reason)) => {
                warn!(peer = %peer, ?reason, "discarded frame");
            }
            Err(FrameError::Closed) => {
                info!(peer = %peer, "server closed the connection");
                break;
            }
            Err(e) => {
                warn!(peer = %peer, "read failed: {e}");
                break;
            }
        }
    }
    shared.shut_down().await;
}

async fn dispatch(shared: Arc<Shared>, payload: Vec<u8>) {
    let packet = match decode_packet(&payload, &shared.registry) {
        Ok(packet) if !packet.is_unknown() => packet,
        Ok(packet) => {
            warn!(request_id = packet.request_id(), "unrecognised packet from server dropped");
            return;
        }
        Err(e) => {
            warn!("bad packet from server dropped: {e}");
            return;
        }
    };

    let packet = match packet {
        Packet::Response(response) => match shared.pending.resolve(response) {
            Resolution::Unmatched(response) => Packet::Response(response),
            resolution => {
                debug!(?resolution, "response routed to its request");
                return;
            }
        },
        other => other,
    };
    debug!(packet = packet.name(), request_id = packet.request_id(), "packet received");
    shared.emit(ClientEvent::PacketReceived(packet));
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_core::correlation::OwnerQueue;
    use hms_core::protocol::{GetDataPacket, LoginPacket, LogoutPacket, ResponseCode, TableId};
    use hms_core::transport::{server_tls_config, TlsAcceptor};
    use hms_server::infrastructure::credential::{default_hosts, generate_self_signed};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    type ServerStream = tokio_rustls::server::TlsStream<TcpStream>;

    /// A scripted peer: accepts one TLS connection and lets the test
    /// read requests and write replies by hand.
    struct FakeServer {
        listener: TcpListener,
        acceptor: TlsAcceptor,
    }

    struct FakePeer {
        session: Arc<Session<ServerStream>>,
        reader: FrameReader<ReadHalf<ServerStream>>,
        registry: PacketRegistry,
    }

    impl FakeServer {
        async fn start() -> (Self, ClientConfig) {
            let credential = generate_self_signed(&default_hosts()).unwrap();
            let acceptor = TlsAcceptor::from(server_tls_config(&credential).unwrap());
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let mut config = ClientConfig::default();
            config.server.port = listener.local_addr().unwrap().port();
            config.requests.timeout_ms = 300;
            (Self { listener, acceptor }, config)
        }

        async fn accept(&self) -> FakePeer {
            let (tcp, peer) = self.listener.accept().await.unwrap();
            let stream = self.acceptor.accept(tcp).await.unwrap();
            let (session, reader) = Session::new(stream, peer);
            FakePeer {
                session,
                reader,
                registry: PacketRegistry::standard(),
            }
        }
    }

    impl FakePeer {
        async fn next_packet(&mut self) -> Packet {
            match self.reader.read_frame().await.unwrap() {
                FrameEvent::Payload(bytes) => decode_packet(&bytes, &self.registry).unwrap(),
                other => panic!("unexpected frame: {other:?}"),
            }
        }

        async fn reply(&self, request: &Packet, code: ResponseCode) {
            let response = ResponsePacket::new(request.request_id(), code, "");
            assert!(self.session.send_packet(&response.into()).await);
        }
    }

    async fn connected() -> (Client, mpsc::Receiver<ClientEvent>, FakePeer) {
        let (server, config) = FakeServer::start().await;
        let (connected, peer) = tokio::join!(Client::connect(&config), server.accept());
        let (client, events) = connected.expect("connect");
        (client, events, peer)
    }

    async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_request_receives_matching_response() {
        // Arrange
        let (client, _events, mut peer) = connected().await;
        let packet = Packet::from(LoginPacket::new("a@b.com", "secret123")).with_request_id(42);

        // Act
        let (result, _) = tokio::join!(client.request(packet), async {
            let request = peer.next_packet().await;
            peer.reply(&request, ResponseCode::Success).await;
        });

        // Assert
        let response = result.expect("response");
        assert_eq!(response.request_id, 42);
        assert!(response.is_success());
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_their_own_responses() {
        // Arrange
        let (client, _events, mut peer) = connected().await;
        let first = Packet::from(GetDataPacket::new(TableId::Rooms)).with_request_id(1001);
        let second = Packet::from(GetDataPacket::new(TableId::Users)).with_request_id(2002);

        // Act: the peer answers in reverse order with distinct codes.
        let (a, b, _) = tokio::join!(client.request(first), client.request(second), async {
            let x = peer.next_packet().await;
            let y = peer.next_packet().await;
            for request in [&y, &x] {
                let code = if request.request_id() == 1001 {
                    ResponseCode::Success
                } else {
                    ResponseCode::AccessDenied
                };
                peer.reply(request, code).await;
            }
        });

        // Assert
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!((a.request_id, a.error_code), (1001, ResponseCode::Success));
        assert_eq!((b.request_id, b.error_code), (2002, ResponseCode::AccessDenied));
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry_and_late_reply_matches_nothing() {
        // Arrange
        let (client, mut events, mut peer) = connected().await;
        let packet = Packet::from(LogoutPacket::new()).with_request_id(7);

        // Act
        let result = client.request(packet).await;
        let request = peer.next_packet().await;
        peer.reply(&request, ResponseCode::Success).await;

        // Assert
        assert!(matches!(result, Err(RequestError::Timeout(_))));
        assert_eq!(client.pending_requests(), 0);
        match next_event(&mut events).await {
            ClientEvent::PacketReceived(Packet::Response(r)) => assert_eq!(r.request_id, 7),
            other => panic!("expected the late reply as an event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_async_callback_runs_only_when_owner_drains() {
        // Arrange
        let (client, _events, mut peer) = connected().await;
        let mut owner = OwnerQueue::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        // Act
        let sent = client
            .request_async(
                Packet::from(GetDataPacket::new(TableId::Bookings)).with_request_id(55),
                &owner.handle(),
                move |response| *sink.lock().unwrap() = Some(response.request_id),
            )
            .await;
        let request = peer.next_packet().await;
        peer.reply(&request, ResponseCode::Success).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while owner.pending() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("callback queued");

        // Assert
        assert!(sent);
        assert_eq!(*seen.lock().unwrap(), None);
        assert_eq!(owner.drain(), 1);
        assert_eq!(*seen.lock().unwrap(), Some(55));
    }

    #[tokio::test]
    async fn test_bad_packet_is_dropped_and_connection_survives() {
        // Arrange
        let (client, mut events, mut peer) = connected().await;

        // Act
        peer.session.send(b"%%% not base64 %%%").await.unwrap();
        let (result, _) = tokio::join!(
            client.request(Packet::from(GetDataPacket::new(TableId::Rooms)).with_request_id(9)),
            async {
                let request = peer.next_packet().await;
                peer.reply(&request, ResponseCode::InvalidTable).await;
            }
        );

        // Assert
        assert!(client.is_connected());
        assert_eq!(result.unwrap().error_code, ResponseCode::InvalidTable);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsolicited_packet_becomes_an_event() {
        let (_client, mut events, peer) = connected().await;
        let notice = Packet::from(ResponsePacket::new(999, ResponseCode::Success, "hello"));

        assert!(peer.session.send_packet(&notice).await);

        assert_eq!(next_event(&mut events).await, ClientEvent::PacketReceived(notice));
    }

    #[tokio::test]
    async fn test_server_close_fails_waiters_and_reports_once() {
        // Arrange
        let (client, mut events, mut peer) = connected().await;

        // Act
        let (result, _) = tokio::join!(
            client.request(Packet::from(GetDataPacket::new(TableId::Users))),
            async {
                peer.next_packet().await;
                peer.session.disconnect().await;
            }
        );

        // Assert
        assert!(matches!(result, Err(RequestError::Disconnected)));
        assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);
        assert!(!client.is_connected());
        assert!(!client.disconnect().await);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_blocks_new_requests() {
        let (client, mut events, _peer) = connected().await;

        assert!(client.disconnect().await);
        assert!(!client.disconnect().await);

        assert_eq!(next_event(&mut events).await, ClientEvent::Disconnected);
        let result = client.request(Packet::from(LogoutPacket::new())).await;
        assert!(matches!(result, Err(RequestError::Disconnected)));
        assert!(!client.send_packet(&Packet::from(LogoutPacket::new())).await);
    }

    #[tokio::test]
    async fn test_disconnect_event_survives_a_full_event_channel() {
        // Arrange
        let (client, mut events, peer) = connected().await;
        let backlog = EVENT_CHANNEL_CAPACITY + 20;
        for id in 0..backlog as u64 {
            let notice = Packet::from(ResponsePacket::new(10_000 + id, ResponseCode::Success, ""));
            assert!(peer.session.send_packet(&notice).await);
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            while events.capacity() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("event channel filled");

        // Act
        peer.session.disconnect().await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client noticed the close");

        // Assert: the backlog drains, then Disconnected arrives exactly once.
        let mut packets = 0;
        let mut disconnects = 0;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), events.recv()).await
        {
            match event {
                ClientEvent::PacketReceived(_) => packets += 1,
                ClientEvent::Disconnected => disconnects += 1,
            }
        }
        assert!(packets >= EVENT_CHANNEL_CAPACITY);
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn test_waiter_registered_after_shutdown_is_removed() {
        // Arrange: the connection closes and fail_all runs first.
        let (client, _events, _peer) = connected().await;
        client.disconnect().await;

        // Act: a request that passed its first connected check registers late.
        let _waiter = client.shared.pending.register_waiter(77).expect("register");
        let kept = client.shared.still_connected(77);

        // Assert
        assert!(!kept);
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = ClientConfig::default();
        config.server.port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Client::connect(&config).await;

        assert!(matches!(result, Err(ClientError::ConnectFailed { .. })));
    }
}
