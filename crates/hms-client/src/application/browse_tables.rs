//! BrowseTablesUseCase: log in as an administrator and read table rows.
//!
//! Every step is one request over a [`RequestChannel`].  A response whose
//! `error_code` is not `Success` becomes [`BrowseError::Rejected`] with the
//! server's own message, so the caller can show it as is.

use std::sync::Arc;

use hms_core::protocol::{GetDataPacket, LoginPacket, LogoutPacket};
use hms_core::{Packet, ResponseCode, ResponsePacket, TableId};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::application::request_channel::{RequestChannel, RequestError};

/// One table row as sent by the server: column name to value.
pub type Row = Map<String, Value>;

/// Errors returned by [`BrowseTablesUseCase`].
#[derive(Debug, Error)]
pub enum BrowseError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("server refused the request ({code:?}): {message}")]
    Rejected { code: ResponseCode, message: String },

    #[error("unexpected response data: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The account the server reports after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub role: String,
}

pub struct BrowseTablesUseCase<C> {
    channel: Arc<C>,
}

impl<C: RequestChannel> BrowseTablesUseCase<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self { channel }
    }

    /// Logs in and returns the account profile.
    ///
    /// # Errors
    ///
    /// - [`BrowseError::Rejected`] for wrong credentials or a non-admin account.
    /// - [`BrowseError::Request`] if no response arrived.
    pub async fn log_in(&self, login: &str, password: &str) -> Result<Profile, BrowseError> {
        let response = self
            .channel
            .request(LoginPacket::new(login, password).into())
            .await?;
        let response = accepted(response)?;
        let profile: Profile = serde_json::from_value(response.additional_data)?;
        info!(login, id = profile.id, role = %profile.role, "logged in");
        Ok(profile)
    }

    /// Reads every row of `table`.
    ///
    /// # Errors
    ///
    /// [`BrowseError::Rejected`] if the session is not an administrator or
    /// the table is empty; [`BrowseError::Request`] if no response arrived.
    pub async fn fetch_table(&self, table: TableId) -> Result<Vec<Row>, BrowseError> {
        let response = self
            .channel
            .request(GetDataPacket::new(table).into())
            .await?;
        let response = accepted(response)?;
        let rows: Vec<Row> = serde_json::from_value(response.additional_data)?;
        debug!(table = table.name(), rows = rows.len(), "table fetched");
        Ok(rows)
    }

    /// Tells the server the session is over.  The server never answers.
    pub async fn log_out(&self) -> bool {
        self.channel.notify(Packet::from(LogoutPacket::new())).await
    }
}

fn accepted(response: ResponsePacket) -> Result<ResponsePacket, BrowseError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(BrowseError::Rejected {
            code: response.error_code,
            message: response.error_message,
        })
    }
}
