//! Codec error types.

use mysqlx_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Transport IO failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes on the wire are not a valid frame or message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection was torn down through an abort handle.
    #[error("connection aborted")]
    Aborted,
}

impl CodecError {
    /// Whether this error comes from the transport rather than the bytes.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed | Self::Aborted)
    }
}
