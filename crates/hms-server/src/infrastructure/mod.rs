//! Infrastructure layer for the server application.
//!
//! Contains the outward-facing adapters: the TLS listener and session
//! manager, certificate generation, configuration files and the table store.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `hms_core`, but MUST NOT be imported by the `application` or domain layers.

pub mod credential;
pub mod server;
pub mod storage;
