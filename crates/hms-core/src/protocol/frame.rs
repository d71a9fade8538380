//! Length-prefixed framing over any async byte stream.
//!
//! Wire format of one frame:
//! ```text
//! [length:4][payload:length]
//! ```
//! `length` is a little-endian `u32` holding the payload byte count.  The
//! payload is opaque to this module (in practice the Base64 text produced by
//! [`encode_packet`](crate::protocol::codec::encode_packet)).
//!
//! # Receiver rules
//!
//! - A frame is only returned once *all* of its payload bytes have arrived;
//!   `read_exact` retries partial reads internally.
//! - A declared length of 0 is noise: the reader reports
//!   [`FrameEvent::Skipped`] and the stream stays usable.
//! - A declared length above the ceiling (10 MiB by default) is never
//!   buffered.  The reader drains exactly that many bytes into a sink so the
//!   next prefix is read from the right offset, then reports
//!   [`FrameEvent::Skipped`].

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload a receiver accepts: 10 MiB.
pub const MAX_FRAME_LEN: u32 = 10 * 1024 * 1024;

/// Errors raised by the frame reader and writer.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream (clean EOF or EOF inside a frame).
    #[error("stream closed by peer")]
    Closed,

    /// Refused to send a zero-length payload.
    #[error("refusing to send an empty frame")]
    EmptyPayload,

    /// Refused to send a payload the peer would discard.
    #[error("payload of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge { len: usize, max: u32 },

    /// Any other I/O failure on the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// `true` for errors that leave the stream unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::Closed | FrameError::Io(_))
    }
}

/// Why a frame was read but not returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    Oversize { declared: u32 },
}

/// Result of one successful [`FrameReader::read_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Payload(Vec<u8>),
    Skipped(SkipReason),
}

/// Builds the wire bytes for one frame.
///
/// # Errors
///
/// Returns [`FrameError::EmptyPayload`] or [`FrameError::PayloadTooLarge`]
/// when the receiver would discard the frame.
pub fn encode_frame(payload: &[u8], max_len: u32) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= max_len)
        .ok_or(FrameError::PayloadTooLarge {
            len: payload.len(),
            max: max_len,
        })?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

fn map_eof(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::Closed
    } else {
        FrameError::Io(e)
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reads frames from the read half of a stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    max_len: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_len(inner, MAX_FRAME_LEN)
    }

    pub fn with_max_len(inner: R, max_len: u32) -> Self {
        Self { inner, max_len }
    }

    pub fn max_len(&self) -> u32 {
        self.max_len
    }

    /// Reads the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Closed`] when the peer closes the stream and
    /// [`FrameError::Io`] for any other read failure.  Both are fatal for the
    /// stream; skipped frames are not errors.
    pub async fn read_frame(&mut self) -> Result<FrameEvent, FrameError> {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        self.inner.read_exact(&mut prefix).await.map_err(map_eof)?;
        let len = u32::from_le_bytes(prefix);

        if len == 0 {
            return Ok(FrameEvent::Skipped(SkipReason::Empty));
        }

        if len > self.max_len {
            let expected = u64::from(len);
            let mut limited = (&mut self.inner).take(expected);
            let drained = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
            if drained < expected {
                return Err(FrameError::Closed);
            }
            return Ok(FrameEvent::Skipped(SkipReason::Oversize { declared: len }));
        }

        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload).await.map_err(map_eof)?;
        Ok(FrameEvent::Payload(payload))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes frames to the write half of a stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    max_len: u32,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_max_len(inner, MAX_FRAME_LEN)
    }

    pub fn with_max_len(inner: W, max_len: u32) -> Self {
        Self { inner, max_len }
    }

    /// Writes one complete frame and flushes it.
    ///
    /// `write_all` reissues the write for the remainder on short writes, so
    /// the frame is either fully handed to the stream or an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::EmptyPayload`] / [`FrameError::PayloadTooLarge`]
    /// without touching the stream, or [`FrameError::Io`] on write failure.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload, self.max_len)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shuts down the write direction of the stream.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
