//! Storage infrastructure: configuration file persistence and the table store.
//!
//! - `config` reads and writes the TOML configuration file, falling back to
//!   defaults when the file does not exist yet.
//! - `memory` implements the application's `Storage` port with in-memory
//!   tables seeded with the configured administrator account.

pub mod config;
pub mod memory;
