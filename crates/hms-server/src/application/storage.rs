//! Storage port used by the packet handlers.
//!
//! The handlers never talk to a database directly.  They go through the
//! [`Storage`] trait, which the infrastructure layer implements (see
//! `infrastructure::storage::memory`).  Rows travel as JSON field maps so the
//! handlers can forward them to clients unchanged.
//!
//! The trait is synchronous: a backend is expected to serialise its own
//! access internally and return quickly.

use hms_core::TableId;
use serde_json::{Map, Value};
use thiserror::Error;

/// One table row: column name → value.
pub type Row = Map<String, Value>;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("column {column} does not exist in {table}")]
    UnknownColumn { table: &'static str, column: String },

    #[error("value for {column} is already taken")]
    Conflict { column: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// An account as stored in the `Users` table.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub role: String,
}

/// Fields supplied when registering a new account.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

/// Persistence operations needed by the request handlers.
#[cfg_attr(test, mockall::automock)]
pub trait Storage: Send + Sync {
    /// Looks up an account by e-mail address.
    fn find_user(&self, email: &str) -> Result<Option<UserRecord>, StorageError>;

    /// Checks `password` against the stored credential of `user`.
    fn verify_password(&self, user: &UserRecord, password: &str) -> bool;

    /// Creates an account and returns its id.
    fn insert_user(&self, user: NewUser) -> Result<i64, StorageError>;

    /// Returns every row of `table` in id order.
    fn fetch_rows(&self, table: TableId) -> Result<Vec<Row>, StorageError>;

    fn find_row(&self, table: TableId, id: i64) -> Result<Option<Row>, StorageError>;

    /// Inserts a row and returns the assigned id.
    fn insert_row(&self, table: TableId, values: Row) -> Result<i64, StorageError>;

    /// Overwrites the given columns.  Returns `false` if the row does not exist.
    fn update_row(&self, table: TableId, id: i64, values: Row) -> Result<bool, StorageError>;

    /// Returns `false` if the row does not exist.
    fn delete_row(&self, table: TableId, id: i64) -> Result<bool, StorageError>;
}
