//! hms-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does hms-client do? (for beginners)
//!
//! The client holds one TLS connection to the hotel management server and
//! turns it into two ways of asking questions:
//!
//! 1. **Synchronous**: [`Client::request`](infrastructure::connection::Client::request)
//!    sends a packet and waits (with a timeout) for the response carrying the
//!    same `request_id`.
//! 2. **Asynchronous**: [`Client::request_async`](infrastructure::connection::Client::request_async)
//!    sends a packet and returns at once.  When the response arrives, the
//!    callback is queued on the caller's `OwnerQueue` and runs the next time
//!    the caller drains that queue.
//!
//! Packets from the server that nobody is waiting for are delivered on the
//! event channel returned by `Client::connect`.

/// Application layer: the request port and the table-browsing use case.
pub mod application;

/// Infrastructure layer: configuration and the TLS connection.
pub mod infrastructure;
