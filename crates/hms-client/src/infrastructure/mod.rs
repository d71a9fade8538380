//! Infrastructure layer for the client application.
//!
//! **Dependency rule**: this layer may depend on `application` and `hms_core`,
//! but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`config`** – TOML configuration: server endpoint, request timeout,
//!   callback lifetime and worker count.
//!
//! - **`connection`** – The TLS connection to the server, the reader task,
//!   inbound dispatch and the correlation-aware request API.  `Client`
//!   implements the application's `RequestChannel` port.

pub mod config;
pub mod connection;
