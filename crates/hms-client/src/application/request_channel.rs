//! The port use cases send requests through.

use std::time::Duration;

use async_trait::async_trait;
use hms_core::{CorrelationError, Packet, ResponsePacket};
use thiserror::Error;

/// Why a synchronous request produced no response.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("request could not be sent")]
    SendFailed,

    #[error("connection closed before the response arrived")]
    Disconnected,

    #[error(transparent)]
    Duplicate(#[from] CorrelationError),
}

/// A connection that can carry requests to the server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestChannel: Send + Sync {
    /// Sends `packet` and waits for the response with the same `request_id`.
    async fn request(&self, packet: Packet) -> Result<ResponsePacket, RequestError>;

    /// Sends `packet` without expecting a reply.  Returns `false` if it was not sent.
    async fn notify(&self, packet: Packet) -> bool;
}
