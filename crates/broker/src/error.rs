//! Error types for the broker crate

use std::io;

use thiserror::Error;

use pond_protocol::ProtocolError;

/// Errors that can occur in the broker
///
/// Per-query failures (`MalformedRecord`, `Protocol`) are answered with an
/// `ERROR` frame and the connection stays up; the remaining kinds tear the
/// whole connection down.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// I/O error (socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame stream cannot be interpreted
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The datagram parser rejected an injected record
    #[error("malformed record: {0}")]
    MalformedRecord(#[source] ProtocolError),

    /// Command in the wrong state, unknown command, duplicate id
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Payload exceeds the 16-bit frame size field
    #[error("payload size {0} exceeds frame limit")]
    Oversized(usize),
}

impl BrokerError {
    /// Create a protocol-violation error
    #[inline]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// True when the connection can keep running after this error
    pub fn is_per_query(&self) -> bool {
        matches!(self, Self::MalformedRecord(_) | Self::Protocol(_))
    }
}
