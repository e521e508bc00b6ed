//! Wire framing
//!
//! Every pond message is a fixed 6-byte header followed by `size` payload
//! bytes. Header layout, big-endian:
//!
//! ```text
//! offset 0  u16  id       client-chosen query id
//! offset 2  u16  command  RequestCommand / ResponseCommand value
//! offset 4  u16  size     payload length (max 65535)
//! ```
//!
//! Reading is buffer-oriented: callers append socket data to a `BytesMut`
//! and call [`Frame::split_from`] until it returns `None`, the same
//! discipline as a length-prefixed stream reader.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ProtocolError, RequestCommand, ResponseCommand, Result};

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 6;

/// Maximum payload size representable by the 16-bit size field
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// A single protocol frame: header plus opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Query id this frame belongs to
    pub id: u16,
    /// Raw command value; interpret via the command enums
    pub command: u16,
    /// Opaque payload (may be empty)
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, rejecting payloads the size field cannot express
    pub fn new(id: u16, command: u16, payload: Bytes) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::Oversized {
                size: payload.len(),
            });
        }

        Ok(Self {
            id,
            command,
            payload,
        })
    }

    /// Create a client → server frame
    pub fn request(id: u16, command: RequestCommand, payload: Bytes) -> Result<Self> {
        Self::new(id, command.into(), payload)
    }

    /// Create a server → client frame
    pub fn response(id: u16, command: ResponseCommand, payload: Bytes) -> Result<Self> {
        Self::new(id, command.into(), payload)
    }

    /// Total encoded size of this frame
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Append the encoded frame to a buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u16(self.id);
        buf.put_u16(self.command);
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);
    }

    /// Encode the frame into a fresh buffer
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Peek at the total length of the next frame in `buf`
    ///
    /// Returns `None` while the buffer does not yet hold a complete frame.
    #[inline]
    pub fn peek(buf: &[u8]) -> Option<usize> {
        if buf.len() < HEADER_SIZE {
            return None;
        }

        let size = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        let total = HEADER_SIZE + size;
        (buf.len() >= total).then_some(total)
    }

    /// Consume one complete frame from the front of `buf`
    ///
    /// Returns `None` while the buffer does not yet hold a complete frame;
    /// leftover bytes stay in place for the next read.
    pub fn split_from(buf: &mut BytesMut) -> Option<Self> {
        Self::peek(buf)?;

        let id = u16::from_be_bytes([buf[0], buf[1]]);
        let command = u16::from_be_bytes([buf[2], buf[3]]);
        let size = u16::from_be_bytes([buf[4], buf[5]]) as usize;

        buf.advance(HEADER_SIZE);
        let payload = buf.split_to(size).freeze();

        Some(Self {
            id,
            command,
            payload,
        })
    }
}
