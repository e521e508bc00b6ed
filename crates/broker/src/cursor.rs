//! Cursor - a stateful iterator that survives eviction
//!
//! A cursor pairs an optional position (a shared handle to the current
//! record) with a persistent last-known id. The position makes the
//! current record directly accessible; the id is the recovery handle:
//! advancement, eviction repair and follow-mode resumption all work by
//! looking up ids in the database, never by memory adjacency, so a
//! cursor stays valid across arbitrary ring wraps.

use std::sync::Arc;

use crate::database::Database;
use crate::record::Record;

/// Iterator over the database, ordered by id
#[derive(Debug)]
pub struct Cursor {
    database: Arc<Database>,
    current: Option<Arc<Record>>,
    /// Last-known id; equals `current.id()` whenever positioned, keeps
    /// its value at the end of the stream so iteration can resume
    id: u64,
}

impl Cursor {
    /// Create an unpositioned cursor
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            database,
            current: None,
            id: 0,
        }
    }

    /// The database this cursor iterates
    #[inline]
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// True when the cursor points at a record
    #[inline]
    pub fn is_positioned(&self) -> bool {
        self.current.is_some()
    }

    /// The current record, if positioned
    #[inline]
    pub fn current(&self) -> Option<&Arc<Record>> {
        self.current.as_ref()
    }

    /// The last-known id (0 before the cursor ever held a position)
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Position at the oldest live record
    pub fn rewind(&mut self) {
        self.current = self.database.first();
        if let Some(record) = &self.current {
            self.id = record.id();
        }
    }

    /// Position at a specific record
    pub fn set_position(&mut self, record: Arc<Record>) {
        self.id = record.id();
        self.current = Some(record);
    }

    /// Position at the smallest live record with an id of at least `id`
    pub fn seek_first_at_or_after(&mut self, id: u64) {
        self.current = self.database.first_at_or_after(id);
        if let Some(record) = &self.current {
            self.id = record.id();
        }
    }

    /// Advance to the next live record by id
    ///
    /// Eviction gaps are skipped implicitly: the next live id after the
    /// current one is `current + 1` or, when the ring has wrapped past
    /// it, the new `min_id`. At the end of the stream the cursor becomes
    /// unpositioned but keeps its id.
    pub fn advance(&mut self) {
        debug_assert!(self.is_positioned(), "advance on unpositioned cursor");

        self.current = self.database.first_at_or_after(self.id + 1);
        if let Some(record) = &self.current {
            self.id = record.id();
        }
    }

    /// Repair the position after an eviction
    ///
    /// Returns true iff the current record is no longer live and the
    /// cursor was repositioned to the smallest live record past it (or to
    /// the end when nothing survives).
    pub fn fix_deleted(&mut self) -> bool {
        let Some(record) = &self.current else {
            return false;
        };

        if self.database.is_live(record.id()) {
            return false;
        }

        self.current = self.database.first_at_or_after(record.id() + 1);
        if let Some(record) = &self.current {
            self.id = record.id();
        }
        true
    }

    /// Take the position an append listener handed over
    ///
    /// Precondition: the cursor is at the end of the stream (that is the
    /// only state in which its owner parks it as a listener).
    pub fn position_appended(&mut self, record: &Arc<Record>) {
        debug_assert!(!self.is_positioned(), "append delivery to positioned cursor");
        self.set_position(Arc::clone(record));
    }
}

#[cfg(test)]
#[path = "cursor_test.rs"]
mod tests;
