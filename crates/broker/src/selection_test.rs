//! Tests for selections

use std::sync::Arc;

use pond_protocol::Datagram;

use super::*;
use crate::database::Database;
use crate::filter::Filter;

fn database(capacity: usize) -> Arc<Database> {
    Arc::new(Database::new(capacity))
}

fn append(db: &Database, site: &str) -> Arc<crate::record::Record> {
    db.emplace(Datagram::new().with_site(site).encode())
        .expect("emplace")
}

fn append_at(db: &Database, site: &str, usec: u64) -> Arc<crate::record::Record> {
    db.emplace(
        Datagram::new()
            .with_site(site)
            .with_timestamp(usec)
            .encode(),
    )
    .expect("emplace")
}

/// Drain a selection into the list of visited record ids
fn collect(selection: &mut Selection) -> Vec<u64> {
    let mut ids = Vec::new();
    while let Some(record) = selection.current() {
        ids.push(record.id());
        selection.advance();
    }
    ids
}

// ============================================================================
// Filtered iteration
// ============================================================================

#[test]
fn test_yields_only_matching_records_in_id_order() {
    let db = database(16);
    append(&db, "a");
    append(&db, "b");
    append(&db, "a");
    append(&db, "c");
    append(&db, "a");

    let mut selection = Selection::new(db, Filter::new().with_site("a"));
    selection.rewind();

    assert_eq!(collect(&mut selection), vec![1, 3, 5]);
    assert!(!selection.is_active());
}

#[test]
fn test_empty_filter_yields_everything() {
    let db = database(16);
    for _ in 0..4 {
        append(&db, "x");
    }

    let mut selection = Selection::new(db, Filter::new());
    selection.rewind();

    assert_eq!(collect(&mut selection), vec![1, 2, 3, 4]);
}

#[test]
fn test_no_match_leaves_selection_inactive() {
    let db = database(16);
    append(&db, "a");

    let mut selection = Selection::new(db, Filter::new().with_site("zzz"));
    selection.rewind();

    assert!(!selection.is_active());
    assert!(selection.current().is_none());
}

#[test]
fn test_empty_database_rewind() {
    let mut selection = Selection::new(database(16), Filter::new());
    selection.rewind();
    assert!(!selection.is_active());
}

#[test]
fn test_two_selections_observe_the_same_order() {
    let db = database(16);
    for site in ["a", "b", "a", "b", "a"] {
        append(&db, site);
    }

    let mut all = Selection::new(Arc::clone(&db), Filter::new());
    all.rewind();
    let mut only_a = Selection::new(db, Filter::new().with_site("a"));
    only_a.rewind();

    let all_ids = collect(&mut all);
    let a_ids = collect(&mut only_a);

    assert_eq!(all_ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(a_ids, vec![1, 3, 5]);
    assert!(a_ids.iter().all(|id| all_ids.contains(id)));
}

// ============================================================================
// Time-range seeding
// ============================================================================

#[test]
fn test_time_range_seeks_and_bounds() {
    let db = database(16);
    let t = 10_000_000u64;
    for i in 0..4 {
        append_at(&db, "a", t + i * 1_000_000);
    }

    let filter = Filter::new().with_time_range(t + 1_000_000, t + 2_000_000);
    let mut selection = Selection::new(db, filter);
    selection.rewind();

    assert!(selection.is_bounded());
    assert_eq!(collect(&mut selection), vec![2, 3]);
}

#[test]
fn test_time_range_bound_excludes_later_appends() {
    let db = database(16);
    append_at(&db, "a", 100);
    append_at(&db, "a", 200);

    let mut selection = Selection::new(Arc::clone(&db), Filter::new().with_time_range(100, 200));
    selection.rewind();
    assert_eq!(collect(&mut selection), vec![1, 2]);

    // A later record with an in-range timestamp lies past end_id and is
    // not picked up by a resume
    append_at(&db, "a", 150);
    selection.resume();
    assert!(!selection.is_active());
}

#[test]
fn test_inverted_time_range_is_empty() {
    let db = database(16);
    append_at(&db, "a", 100);

    let mut selection = Selection::new(db, Filter::new().with_time_range(200, 100));
    selection.rewind();
    assert!(!selection.is_active());
}

#[test]
fn test_time_range_with_no_records_in_range() {
    let db = database(16);
    append_at(&db, "a", 100);

    let mut selection = Selection::new(db, Filter::new().with_time_range(500, 900));
    selection.rewind();
    assert!(!selection.is_active());
    // The bound stays open, this selection never produced an end id
    assert!(!selection.is_bounded());
}

#[test]
fn test_full_time_range_equals_plain_scan() {
    let db = database(16);
    for i in 0..5 {
        append_at(&db, if i % 2 == 0 { "a" } else { "b" }, 100 + i);
    }

    let mut scanned = Selection::new(Arc::clone(&db), Filter::new().with_site("a"));
    scanned.rewind();

    let mut seeked = Selection::new(
        db,
        Filter::new()
            .with_site("a")
            .with_time_range(u64::MIN + 1, u64::MAX),
    );
    seeked.rewind();

    assert_eq!(collect(&mut scanned), collect(&mut seeked));
}

// ============================================================================
// Eviction repair
// ============================================================================

#[test]
fn test_fix_deleted_repositions_and_refilters() {
    let db = database(3);
    append(&db, "a"); // 1
    append(&db, "b"); // 2
    append(&db, "a"); // 3

    let mut selection = Selection::new(Arc::clone(&db), Filter::new().with_site("a"));
    selection.rewind();
    assert_eq!(selection.current().unwrap().id(), 1);

    // Appends 4 and 5 evict records 1 and 2; the repaired head (3)
    // matches, the mismatching survivors are skipped transparently
    append(&db, "b"); // 4
    append(&db, "a"); // 5

    assert!(selection.fix_deleted());
    assert_eq!(collect(&mut selection), vec![3, 5]);
}

#[test]
fn test_fix_deleted_skips_mismatching_new_head() {
    let db = database(2);
    append(&db, "a"); // 1
    append(&db, "b"); // 2

    let mut selection = Selection::new(Arc::clone(&db), Filter::new().with_site("a"));
    selection.rewind();
    assert_eq!(selection.current().unwrap().id(), 1);

    append(&db, "b"); // 3, evicts 1
    append(&db, "a"); // 4, evicts 2

    // Repair lands past the mismatching record 3, directly on 4
    assert!(selection.fix_deleted());
    assert_eq!(selection.current().unwrap().id(), 4);
}

#[test]
fn test_eviction_race_delivers_at_most_once() {
    let db = database(2);
    append(&db, "a"); // 1
    append(&db, "a"); // 2

    let mut selection = Selection::new(Arc::clone(&db), Filter::new());
    selection.rewind();

    // Record 1 is delivered; before the scan advances, two more appends
    // evict both 1 and 2
    let mut delivered = vec![selection.current().unwrap().id()];
    append(&db, "a"); // 3, evicts 1
    append(&db, "a"); // 4, evicts 2

    assert!(selection.fix_deleted());
    delivered.extend(collect(&mut selection));

    // 2 was evicted unseen, 1 is not delivered twice
    assert_eq!(delivered, vec![1, 3, 4]);
}

#[test]
fn test_fix_deleted_on_live_position_is_noop() {
    let db = database(4);
    append(&db, "a");

    let mut selection = Selection::new(db, Filter::new());
    selection.rewind();
    assert!(!selection.fix_deleted());
}

// ============================================================================
// Follow-mode hooks
// ============================================================================

#[test]
fn test_on_append_accepts_matching_record() {
    let db = database(4);
    let mut selection = Selection::new(Arc::clone(&db), Filter::new().with_site("x"));
    selection.rewind();
    assert!(!selection.is_active());

    let record = append(&db, "x");
    assert!(selection.on_append(&record));
    assert_eq!(selection.current().unwrap().id(), record.id());
}

#[test]
fn test_on_append_rejects_mismatch() {
    let db = database(4);
    let mut selection = Selection::new(Arc::clone(&db), Filter::new().with_site("x"));
    selection.rewind();

    let record = append(&db, "y");
    assert!(!selection.on_append(&record));
    assert!(!selection.is_active());
}

#[test]
fn test_resume_picks_up_missed_records() {
    let db = database(8);
    append(&db, "x"); // 1

    let mut selection = Selection::new(Arc::clone(&db), Filter::new().with_site("x"));
    selection.rewind();
    assert_eq!(collect(&mut selection), vec![1]);

    // Records arrive while the selection holds no position
    append(&db, "y"); // 2
    append(&db, "x"); // 3

    selection.resume();
    assert_eq!(collect(&mut selection), vec![3]);
}

#[test]
fn test_resume_is_idempotent_when_positioned() {
    let db = database(8);
    append(&db, "x");
    append(&db, "x");

    let mut selection = Selection::new(db, Filter::new());
    selection.rewind();
    let before = selection.current().unwrap().id();

    selection.resume();
    assert_eq!(selection.current().unwrap().id(), before);
}

#[test]
fn test_resume_never_redelivers() {
    let db = database(8);
    append(&db, "x"); // 1

    let mut selection = Selection::new(Arc::clone(&db), Filter::new());
    selection.rewind();
    assert_eq!(collect(&mut selection), vec![1]);

    // Nothing new: resume finds nothing, id 1 stays delivered-once
    selection.resume();
    assert!(!selection.is_active());
}
