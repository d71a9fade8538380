//! # hms-core
//!
//! Shared library for the hotel management service: the wire protocol, the
//! packet model, the worker pool, request correlation and the TLS transport.
//!
//! Both the server and the client applications build on this crate.
//!
//! # Architecture overview (for beginners)
//!
//! A client opens a TLS connection to the server and exchanges *packets*:
//! small JSON objects such as "log me in" or "give me the rooms table".  The
//! server answers every request with a `ResponsePacket` carrying the same
//! `request_id`, which is how the client knows which answer belongs to which
//! question.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`protocol`** – How packets travel.  Each packet becomes JSON, the
//!   JSON is Base64-encoded, and the result is sent as one length-prefixed
//!   frame.  A registry maps the numeric `type` tag back to a concrete
//!   packet on the other end.
//!
//! - **`worker_pool`** – A fixed set of async workers that run submitted
//!   jobs, so a slow request never blocks the network reader.
//!
//! - **`correlation`** – The table of requests still waiting for their
//!   response, plus the per-owner task queue used for deferred callbacks.
//!
//! - **`transport`** – TLS configuration, TCP keepalive and the
//!   [`Session`](transport::Session) type wrapping one live connection.

pub mod correlation;
pub mod protocol;
pub mod transport;
pub mod worker_pool;

// Re-export the most-used types at the crate root so callers can write
// `hms_core::Packet` instead of `hms_core::protocol::packet::Packet`.
pub use correlation::{
    CorrelationError, OwnerQueue, OwnerQueueHandle, PendingRequests, Resolution, ResponseCallback,
};
pub use protocol::codec::{decode_packet, encode_packet};
pub use protocol::packet::{Packet, PacketError, PacketKind, ResponseCode, ResponsePacket, TableId};
pub use protocol::registry::PacketRegistry;
pub use transport::{Session, SessionLimits, SessionStatus, TransportError};
pub use worker_pool::{PoolError, ShutdownMode, WorkerPool};
