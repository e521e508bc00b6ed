//! Selection - a cursor composed with a filter
//!
//! A selection iterates only the records its filter accepts, in id order,
//! optionally bounded above by `end_id` when the filter carries a finite
//! upper time bound. Non-matching records are skipped transparently; two
//! selections over the same database observe their matches in the same
//! id interleaving.

use std::sync::Arc;

use crate::cursor::Cursor;
use crate::database::Database;
use crate::filter::Filter;
use crate::record::Record;

/// Filtered, id-ordered view over the database
#[derive(Debug)]
pub struct Selection {
    cursor: Cursor,
    filter: Filter,
    /// Upper id bound (inclusive); `u64::MAX` when the time range is open
    end_id: u64,
}

impl Selection {
    /// Create a selection; call [`rewind`](Self::rewind) before iterating
    pub fn new(database: Arc<Database>, filter: Filter) -> Self {
        Self {
            cursor: Cursor::new(database),
            filter,
            end_id: u64::MAX,
        }
    }

    /// The filter this selection applies
    #[inline]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Last-known id of the underlying cursor
    #[inline]
    pub fn last_id(&self) -> u64 {
        self.cursor.id()
    }

    /// True when a finite upper time bound limits this selection
    ///
    /// A bounded selection ends once the bound is passed, even in follow
    /// mode; only unbounded selections park for live records.
    #[inline]
    pub fn is_bounded(&self) -> bool {
        self.end_id != u64::MAX
    }

    /// True when the selection currently yields a record
    #[inline]
    pub fn is_active(&self) -> bool {
        self.cursor
            .current()
            .is_some_and(|record| record.id() <= self.end_id)
    }

    /// The current record, if any
    #[inline]
    pub fn current(&self) -> Option<&Arc<Record>> {
        self.cursor.current().filter(|r| r.id() <= self.end_id)
    }

    /// Position at the first matching record
    ///
    /// With a finite time range this seeks the `(timestamp, id)` index
    /// instead of scanning from the oldest record, and bounds the scan
    /// with the id of the last record in range.
    pub fn rewind(&mut self) {
        debug_assert!(!self.cursor.is_positioned(), "rewind of an active selection");

        if self.filter.has_time_range() {
            let (first, last) = self
                .cursor
                .database()
                .time_range(self.filter.since, self.filter.until);

            let Some(first) = first else {
                // Nothing in range; stays empty (follow mode may still
                // deliver future records, the filter re-checks time)
                return;
            };

            self.cursor.seek_first_at_or_after(first);
            if let Some(last) = last {
                self.end_id = last;
            }
        } else {
            self.cursor.rewind();
        }

        self.skip_mismatches();
    }

    /// Advance the cursor past records the filter rejects
    fn skip_mismatches(&mut self) {
        while let Some(record) = self.cursor.current() {
            if record.id() > self.end_id || self.filter.matches(record.parsed()) {
                break;
            }
            self.cursor.advance();
        }
    }

    /// Advance to the next matching record
    pub fn advance(&mut self) {
        self.cursor.advance();
        self.skip_mismatches();
    }

    /// Repair the position after an eviction
    ///
    /// Returns true iff the cursor was repositioned; the new head is
    /// re-filtered, so no stale or mismatching record is ever yielded
    /// and no surviving match is skipped.
    pub fn fix_deleted(&mut self) -> bool {
        if !self.cursor.fix_deleted() {
            return false;
        }

        self.skip_mismatches();
        true
    }

    /// Reposition an idle selection at the first match past the last
    /// seen id
    ///
    /// Used when resuming after the stream was exhausted: records that
    /// arrived while no position was held (e.g. between an append
    /// notification and re-registering for the next one) are picked up
    /// here, strictly after the last delivered id.
    pub fn resume(&mut self) {
        if self.cursor.is_positioned() {
            return;
        }

        let from = self.cursor.id() + 1;
        self.cursor.seek_first_at_or_after(from);
        self.skip_mismatches();
    }

    /// Offer a freshly appended record to this selection
    ///
    /// Returns false (and leaves the cursor unpositioned) when the filter
    /// rejects the record or it lies past the selection's end; returns
    /// true after taking the record as the current position.
    pub fn on_append(&mut self, record: &Arc<Record>) -> bool {
        debug_assert!(!self.is_active(), "append offered to an active selection");

        if record.id() > self.end_id || !self.filter.matches(record.parsed()) {
            return false;
        }

        self.cursor.position_appended(record);
        true
    }
}

#[cfg(test)]
#[path = "selection_test.rs"]
mod tests;
