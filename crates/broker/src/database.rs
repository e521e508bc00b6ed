//! The append-only record database
//!
//! A capacity-bounded ring of [`Record`]s ordered by id. Appends assign
//! strictly increasing ids, so the live set is always the contiguous
//! interval `[min_id, max_id]` and the id index is pure arithmetic into
//! the ring. A `(timestamp, id)` tree supports O(log n) time-range seeks;
//! producers may deliver slightly out-of-order timestamps, the id breaks
//! ties deterministically.
//!
//! # Append listeners
//!
//! A parked follow query registers an [`AppendSink`]; the next append
//! fires every registered listener exactly once, in registration order,
//! and unlinks it. Listeners re-register to hear further appends.
//! Notification happens under the store lock, so appends and their
//! fan-out are one serialized step and no listener can observe them out
//! of order.
//!
//! Eviction does not notify anyone: cursors repair themselves lazily via
//! `fix_deleted`, which keeps the append path cheap.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::trace;

use pond_protocol::Datagram;

use crate::error::BrokerError;
use crate::record::Record;

/// Maximum ring capacity to prevent memory issues
const MAX_CAPACITY: usize = 16_777_216;

/// Handle identifying one registered append listener
pub type ListenerToken = u64;

/// Receiver half of the append broadcast
///
/// Fired at most once per registration, while the database lock is held;
/// implementations must only hand the record off (e.g. into a channel)
/// and must not call back into the [`Database`].
pub trait AppendSink: Send + Sync {
    /// Called with the newly appended record
    fn on_append(&self, token: ListenerToken, record: &Arc<Record>);
}

struct Listener {
    token: ListenerToken,
    sink: Box<dyn AppendSink>,
}

struct Store {
    /// Ring of live records, ordered by id; the id index is implicit:
    /// a live id sits at position `id - min_id`
    records: VecDeque<Arc<Record>>,
    /// Records with a parsed timestamp, ordered by (timestamp, id)
    by_time: BTreeSet<(u64, u64)>,
    /// Highest id ever assigned; ids start at 1
    last_id: u64,
    /// Listeners waiting for the next append
    listeners: Vec<Listener>,
    appended_total: u64,
    evicted_total: u64,
}

impl Store {
    fn min_id(&self) -> Option<u64> {
        self.records.front().map(|r| r.id())
    }

    fn get(&self, id: u64) -> Option<&Arc<Record>> {
        let min_id = self.min_id()?;
        let position = id.checked_sub(min_id)?;
        if position >= self.records.len() as u64 {
            return None;
        }
        self.records.get(position as usize)
    }
}

/// Snapshot of database counters
#[derive(Debug, Clone, Copy)]
pub struct DatabaseStats {
    /// Live records in the ring
    pub record_count: usize,
    /// Smallest live id (0 when empty)
    pub min_id: u64,
    /// Highest id ever assigned
    pub last_id: u64,
    /// Records appended over the database lifetime
    pub appended_total: u64,
    /// Records evicted over the database lifetime
    pub evicted_total: u64,
    /// Currently registered append listeners
    pub listener_count: usize,
}

/// The append-only, capacity-bounded record store
pub struct Database {
    capacity: usize,
    store: RwLock<Store>,
    next_token: AtomicU64,
}

impl Database {
    /// Create a database holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY);
        Self {
            capacity,
            store: RwLock::new(Store {
                records: VecDeque::with_capacity(capacity.min(4096)),
                by_time: BTreeSet::new(),
                last_id: 0,
                listeners: Vec::new(),
                appended_total: 0,
                evicted_total: 0,
            }),
            next_token: AtomicU64::new(1),
        }
    }

    /// Get the ring capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Parse and append one datagram
    ///
    /// Assigns the next id, evicts the oldest record when the ring is
    /// full, updates the indexes and fires all registered append
    /// listeners. Fails only when the datagram does not parse.
    pub fn emplace(&self, raw: Bytes) -> Result<Arc<Record>, BrokerError> {
        let parsed = Datagram::parse(&raw).map_err(BrokerError::MalformedRecord)?;

        let mut store = self.store.write();

        store.last_id += 1;
        let record = Arc::new(Record::new(store.last_id, raw, parsed));

        if store.records.len() == self.capacity
            && let Some(evicted) = store.records.pop_front()
        {
            if let Some(ts) = evicted.parsed().timestamp {
                store.by_time.remove(&(ts, evicted.id()));
            }
            store.evicted_total += 1;
        }

        if let Some(ts) = record.parsed().timestamp {
            store.by_time.insert((ts, record.id()));
        }
        store.records.push_back(Arc::clone(&record));
        store.appended_total += 1;

        // Fire-and-unlink, in registration order; the vec's allocation is
        // kept so the append path does not allocate. The store lock is
        // held throughout, so no registration can interleave.
        let mut fired = std::mem::take(&mut store.listeners);
        for listener in &fired {
            listener.sink.on_append(listener.token, &record);
        }
        fired.clear();
        store.listeners = fired;

        trace!(id = record.id(), "record appended");

        Ok(record)
    }

    /// Look up a live record by id
    pub fn get(&self, id: u64) -> Option<Arc<Record>> {
        self.store.read().get(id).cloned()
    }

    /// The oldest live record
    pub fn first(&self) -> Option<Arc<Record>> {
        self.store.read().records.front().cloned()
    }

    /// The newest live record
    pub fn last(&self) -> Option<Arc<Record>> {
        self.store.read().records.back().cloned()
    }

    /// The smallest live record with an id of at least `id`
    ///
    /// This is the repair lookup: after eviction the live set still
    /// begins at `min_id`, so a cursor whose record is gone lands on the
    /// next surviving one.
    pub fn first_at_or_after(&self, id: u64) -> Option<Arc<Record>> {
        let store = self.store.read();
        let min_id = store.min_id()?;
        store.get(id.max(min_id)).cloned()
    }

    /// True when a record with this id is still in the ring
    pub fn is_live(&self, id: u64) -> bool {
        self.store.read().get(id).is_some()
    }

    /// Highest id ever assigned (0 before the first append)
    pub fn last_id(&self) -> u64 {
        self.store.read().last_id
    }

    /// Ids of the first and last record whose timestamp lies in
    /// `[since, until]` (microseconds, both inclusive)
    ///
    /// `(None, None)` when no record matches. Endpoints follow the
    /// `(timestamp, id)` index order, which with out-of-order producer
    /// timestamps is an approximation; the filter re-checks the bounds on
    /// every record scanned.
    pub fn time_range(&self, since: u64, until: u64) -> (Option<u64>, Option<u64>) {
        if since > until {
            return (None, None);
        }

        let store = self.store.read();
        let mut range = store.by_time.range((since, u64::MIN)..=(until, u64::MAX));

        let first = range.next().map(|&(_, id)| id);
        let last = range.next_back().map(|&(_, id)| id).or(first);
        (first, last)
    }

    /// Register a listener for the next append
    ///
    /// The listener fires exactly once and is unlinked by firing. The
    /// returned token identifies the registration for
    /// [`remove_listener`](Self::remove_listener) and is echoed back to
    /// the sink, which lets the owner detect stale deliveries.
    pub fn add_listener(&self, sink: Box<dyn AppendSink>) -> ListenerToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut store = self.store.write();
        debug_assert!(
            store.listeners.iter().all(|l| l.token != token),
            "listener token registered twice"
        );
        store.listeners.push(Listener { token, sink });
        token
    }

    /// Unregister a listener that has not fired yet
    ///
    /// Returns false when the token is unknown, i.e. the listener already
    /// fired or was never registered.
    pub fn remove_listener(&self, token: ListenerToken) -> bool {
        let mut store = self.store.write();
        let before = store.listeners.len();
        store.listeners.retain(|l| l.token != token);
        store.listeners.len() != before
    }

    /// Number of currently registered append listeners
    pub fn listener_count(&self) -> usize {
        self.store.read().listeners.len()
    }

    /// Get a counters snapshot
    pub fn stats(&self) -> DatabaseStats {
        let store = self.store.read();
        DatabaseStats {
            record_count: store.records.len(),
            min_id: store.min_id().unwrap_or(0),
            last_id: store.last_id,
            appended_total: store.appended_total,
            evicted_total: store.evicted_total,
            listener_count: store.listeners.len(),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Database")
            .field("capacity", &self.capacity)
            .field("record_count", &stats.record_count)
            .field("last_id", &stats.last_id)
            .finish()
    }
}

#[cfg(test)]
#[path = "database_test.rs"]
mod tests;
