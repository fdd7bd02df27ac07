//! Transport boundary.
//!
//! Session loops only see [`Frame`]s through a [`FrameSource`] and a
//! [`FrameSink`]. Deadlines are not part of the transport; the loops wrap
//! calls in `tokio::time::timeout`.

#[cfg(test)]
pub(crate) mod memory;
pub mod ws;

use async_trait::async_trait;
use thiserror::Error;

/// A transport-level frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Liveness probe.
    Ping(Vec<u8>),
    /// Liveness answer.
    Pong(Vec<u8>),
    /// Orderly close.
    Close,
}

/// Errors surfaced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer or the transport has gone away.
    #[error("transport closed")]
    Closed,
    /// The transport rejected a frame for exceeding its own size limit.
    #[error("frame exceeds the transport size limit")]
    TooLarge,
    /// Anything else from the underlying I/O.
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Read half of a transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound frame, or `None` at end of stream.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Write half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the transport. Safe to call more than once.
    async fn close(&mut self);
}
