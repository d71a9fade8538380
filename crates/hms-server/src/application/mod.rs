//! Application layer use cases for the server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules) and the infrastructure (network, storage).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a client's request (e.g., "log
//!   this client in if the credentials match an administrator").
//! - **Depend on abstractions** (traits) rather than concrete implementations,
//!   so the infrastructure can be swapped without changing this code.
//! - **Contain no network I/O and no file system access**.
//!
//! # Sub-modules
//!
//! - **`serve_requests`** – The [`PacketHandler`](serve_requests::PacketHandler)
//!   seam and the use case answering every request packet.
//!
//! - **`storage`** – The [`Storage`](storage::Storage) port the use case
//!   reads and writes tables through.

pub mod serve_requests;
pub mod storage;
