//! Application layer use cases for the client.
//!
//! Use cases here talk to the server only through the
//! [`RequestChannel`](request_channel::RequestChannel) port, so they can be
//! tested with a mock channel and no network.
//!
//! # Sub-modules
//!
//! - **`request_channel`** – The port: send a request and await its
//!   response, or send a notification with no reply.
//! - **`browse_tables`** – Log in, read a table, log out.

pub mod browse_tables;
pub mod request_channel;
