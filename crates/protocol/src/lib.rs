//! Pond wire protocol - framing and record codec for the pond broker
//!
//! This crate provides the types shared by the broker and its clients:
//! - `Frame` - the 6-byte `{id, command, size}` header plus opaque payload
//! - `RequestCommand` / `ResponseCommand` - the command taxonomy
//! - `Datagram` - the parsed access-log record and its TLV codec
//!
//! # Design Principles
//!
//! - **Zero-copy**: payloads travel as `bytes::Bytes`; a record's raw
//!   datagram is sliced out of the read buffer once and shared from there
//! - **Streaming-friendly**: `Frame::peek` / `Frame::split_from` operate on
//!   a growing `BytesMut` so partial reads never copy
//! - **Forward compatible**: unknown datagram attributes are skipped, not
//!   rejected

mod command;
mod datagram;
mod error;
mod frame;

pub use command::{RequestCommand, ResponseCommand};
pub use datagram::{Datagram, Method};
pub use error::ProtocolError;
pub use frame::{Frame, HEADER_SIZE, MAX_PAYLOAD};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Default TCP port of the pond broker
pub const DEFAULT_PORT: u16 = 5480;

#[cfg(test)]
mod datagram_test;
