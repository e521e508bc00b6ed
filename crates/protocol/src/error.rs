//! Protocol error types
//!
//! Errors that can occur when framing messages or parsing log datagrams.

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Input is too short to contain required fields
    #[error("input too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Payload exceeds the 16-bit frame size field
    #[error("payload size {size} exceeds frame limit {max}", max = crate::MAX_PAYLOAD)]
    Oversized { size: usize },

    /// Command value not part of the protocol
    #[error("unknown command: {0}")]
    UnknownCommand(u16),

    /// Malformed log datagram
    #[error("malformed datagram: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Create an input-too-short error
    #[inline]
    pub fn too_short(expected: usize, actual: usize) -> Self {
        Self::TooShort { expected, actual }
    }

    /// Create a malformed-datagram error
    #[inline]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
