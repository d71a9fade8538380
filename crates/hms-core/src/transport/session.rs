//! One connected peer: a framed writer plus a connected/disconnected flag.
//!
//! [`Session::new`] splits a stream into halves.  The write half stays inside
//! the session behind an async mutex, so concurrent senders never interleave
//! frames.  The read half is returned to the caller as a [`FrameReader`]; the
//! owner of the session drives its own read loop.
//!
//! Disconnecting is idempotent: the first call flips the flag, notifies
//! everyone waiting in [`Session::closed`] and shuts the write half down.
//! Later calls return `false` and do nothing.
//!
//! Every frame write is bounded by [`SessionLimits::write_timeout`].  A peer
//! that stops reading fills its socket buffer; when the deadline passes the
//! session is closed while the writer lock is still held, so senders queued
//! behind it fail fast with [`TransportError::Disconnected`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::protocol::codec::encode_packet;
use crate::protocol::frame::{FrameError, FrameReader, FrameWriter, MAX_FRAME_LEN};
use crate::protocol::packet::{Packet, PacketError};

/// How long a disconnect waits for the write half to shut down cleanly.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Default upper bound on writing one frame.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-session framing and write limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Largest payload accepted in either direction.
    pub max_frame_len: u32,
    /// How long one frame write may block before the session is closed.
    pub write_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Errors returned by [`Session::send`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session is disconnected")]
    Disconnected,

    #[error("failed to encode packet: {0}")]
    Encode(#[from] PacketError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("frame write did not finish within {0:?}")]
    WriteTimeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connected,
    Disconnected,
}

/// Write side and lifecycle of one connection.
pub struct Session<S> {
    peer: SocketAddr,
    writer: Mutex<FrameWriter<WriteHalf<S>>>,
    write_timeout: Duration,
    connected: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps `stream`, returning the session and the reader for its inbound frames.
    pub fn new(stream: S, peer: SocketAddr) -> (Arc<Self>, FrameReader<ReadHalf<S>>) {
        Self::with_limits(stream, peer, SessionLimits::default())
    }

    pub fn with_max_frame_len(
        stream: S,
        peer: SocketAddr,
        max_frame_len: u32,
    ) -> (Arc<Self>, FrameReader<ReadHalf<S>>) {
        let limits = SessionLimits {
            max_frame_len,
            ..SessionLimits::default()
        };
        Self::with_limits(stream, peer, limits)
    }

    pub fn with_limits(
        stream: S,
        peer: SocketAddr,
        limits: SessionLimits,
    ) -> (Arc<Self>, FrameReader<ReadHalf<S>>) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (closed_tx, _) = watch::channel(false);
        let session = Arc::new(Self {
            peer,
            writer: Mutex::new(FrameWriter::with_max_len(write_half, limits.max_frame_len)),
            write_timeout: limits.write_timeout,
            connected: AtomicBool::new(true),
            closed_tx,
        });
        (session, FrameReader::with_max_len(read_half, limits.max_frame_len))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn status(&self) -> SessionStatus {
        if self.is_connected() {
            SessionStatus::Connected
        } else {
            SessionStatus::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Writes one frame carrying `payload`.
    ///
    /// A fatal write error or an expired write deadline disconnects the
    /// session before it is returned.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Disconnected`] if the session is already closed.
    /// - [`TransportError::Frame`] if the frame could not be written.
    /// - [`TransportError::WriteTimeout`] if the peer stopped reading.
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let error = {
            let mut writer = self.writer.lock().await;
            if !self.is_connected() {
                return Err(TransportError::Disconnected);
            }
            let write = writer.write_frame(payload);
            let error = match tokio::time::timeout(self.write_timeout, write).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) if !e.is_fatal() => return Err(e.into()),
                Ok(Err(e)) => TransportError::from(e),
                Err(_) => TransportError::WriteTimeout(self.write_timeout),
            };
            // Closed under the lock: queued senders see it as soon as they get in.
            if !self.mark_closed() {
                return Err(error);
            }
            error
        };
        warn!(peer = %self.peer, "write failed, disconnecting: {error}");
        self.shutdown_writer().await;
        Err(error)
    }

    /// Encodes and sends `packet`.  Returns `false` on any failure.
    pub async fn send_packet(&self, packet: &Packet) -> bool {
        if !self.is_connected() {
            return false;
        }
        let payload = match encode_packet(packet) {
            Ok(p) => p,
            Err(e) => {
                warn!(peer = %self.peer, packet = packet.name(), "encode failed: {e}");
                return false;
            }
        };
        match self.send(&payload).await {
            Ok(()) => true,
            Err(e) => {
                debug!(peer = %self.peer, packet = packet.name(), "send failed: {e}");
                false
            }
        }
    }

    /// Closes the session.  Returns `true` only for the call that closed it.
    pub async fn disconnect(&self) -> bool {
        if !self.mark_closed() {
            return false;
        }
        self.shutdown_writer().await;
        true
    }

    fn mark_closed(&self) -> bool {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.closed_tx.send_replace(true);
        true
    }

    async fn shutdown_writer(&self) {
        let shutdown = async {
            let mut writer = self.writer.lock().await;
            writer.shutdown().await
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, shutdown).await {
            Ok(Ok(())) => debug!(peer = %self.peer, "session closed"),
            Ok(Err(e)) => debug!(peer = %self.peer, "shutdown error ignored: {e}"),
            Err(_) => debug!(peer = %self.peer, "shutdown timed out"),
        }
    }

    /// Resolves once the session has been disconnected.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}
