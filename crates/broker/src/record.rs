//! The immutable log record

use bytes::Bytes;

use pond_protocol::Datagram;

/// One parsed log datagram with its broker-assigned id
///
/// Records are created by [`Database::emplace`](crate::Database::emplace)
/// and shared as `Arc<Record>`; the database drops its reference on
/// eviction, in-flight deliveries keep theirs.
#[derive(Debug)]
pub struct Record {
    id: u64,
    raw: Bytes,
    parsed: Datagram,
}

impl Record {
    pub(crate) fn new(id: u64, raw: Bytes, parsed: Datagram) -> Self {
        Self { id, raw, parsed }
    }

    /// The monotonic id, assigned at append time (never zero, never reused)
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The raw datagram bytes as received from the producer
    #[inline]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The parsed view of the datagram
    #[inline]
    pub fn parsed(&self) -> &Datagram {
        &self.parsed
    }
}
