//! Domain layer for the server: state that belongs to one connected client.
//!
//! Pure data, no I/O.  The server keeps one [`ClientState`] per session and
//! hands it to the packet handlers by mutable reference while holding that
//! session's lock.

pub mod client_state;
