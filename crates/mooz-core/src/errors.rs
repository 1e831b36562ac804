//! Error types shared by the hub and its transports.

use thiserror::Error;

/// Failure to move a message over a client connection.
///
/// Every variant is fatal to the session that observed it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection (close frame or end of stream).
    #[error("connection closed by peer")]
    Closed,
    /// The underlying socket failed.
    #[error("transport I/O error: {0}")]
    Io(String),
    /// A frame could not be encoded or decoded as a message.
    #[error("frame codec error: {0}")]
    Codec(#[from] serde_json::Error),
    /// A frame type the hub does not accept (e.g. non-UTF-8 binary).
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
}

/// A well-formed message whose content violates the hub protocol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A `pong` whose `data` is not a numeric probe stamp.
    #[error("malformed pong payload: {0}")]
    MalformedPong(String),
}
