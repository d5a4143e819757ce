mod common;

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use common::*;
use durindex::core::clock::ManualClock;
use durindex::{Batch, Change, ErrorKind, Index, Query, RecoveryState};
use tempfile::TempDir;

fn names(index: &Index, names: &[&str]) -> Vec<String> {
    let clauses: Vec<Query> = names.iter().map(|name| Query::term("Name", *name)).collect();
    let query = if clauses.len() == 1 {
        clauses.into_iter().next().unwrap()
    } else {
        Query::or(clauses)
    };
    sorted(index.query(&query, 100).unwrap())
}

fn dir_entries(path: &std::path::Path) -> BTreeSet<String> {
    fs::read_dir(path)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn each_flush_gets_a_commit_point_with_its_own_copy() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    let index = open(eager_config(dir.path()), &store);

    put(&index, &store, user("users/2", "Michael"));
    put(&index, &store, user("users/3", "Arek"));

    let points = index.commit_points().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].last_processed_etag, 1);
    assert_eq!(points[1].last_processed_etag, 2);

    let root = dir.path().join("CommitPoints");
    assert_eq!(
        dir_entries(&root),
        BTreeSet::from(["00000001".to_string(), "00000002".to_string()])
    );
    assert_eq!(
        dir_entries(&root.join("00000001")),
        BTreeSet::from(["index.commitPoint".to_string(), "segment_00000001.seg".to_string()])
    );
    assert_eq!(
        dir_entries(&root.join("00000002")),
        BTreeSet::from(["index.commitPoint".to_string(), "segment_00000002.seg".to_string()])
    );
}

#[test]
fn stored_commit_points_are_bounded() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    let index = open(eager_config(dir.path()), &store);
    let max = index.config().max_stored_commit_points;

    for i in 0..max * 2 {
        put(&index, &store, user(&format!("users/{}", i), "Arek"));
        assert!(index.commit_points().unwrap().len() <= max);
    }

    let points = index.commit_points().unwrap();
    assert_eq!(points.len(), max);
    assert_eq!(points.last().unwrap().last_processed_etag, store.last_etag());
    assert_eq!(dir_entries(&dir.path().join("CommitPoints")).len(), max);
}

#[test]
fn recovers_from_last_commit_point_and_replays_the_rest() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(first_flush_only_config(dir.path()), &store);
        put(&index, &store, user("users/1", "One"));
        put(&index, &store, user("users/2", "Two"));
        assert_eq!(index.commit_points().unwrap().len(), 1);
    }

    corrupt_newest_segment(dir.path());

    let index = open(first_flush_only_config(dir.path()), &store);
    let report = index.recovery_report();
    assert!(report.restored());
    assert_eq!(report.restored_from.as_ref().unwrap().last_processed_etag, 1);
    assert_eq!(report.replayed_changes, 1);
    assert_eq!(
        report.transitions,
        vec![
            RecoveryState::Validating,
            RecoveryState::Restoring,
            RecoveryState::Replaying,
            RecoveryState::Ready
        ]
    );

    assert_eq!(names(&index, &["One", "Two"]), vec!["users/1", "users/2"]);
    assert_eq!(index.durable_etag(), 2);
    assert_eq!(index.commit_points().unwrap().len(), 2);
}

#[test]
fn recovery_replays_deletes() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(first_flush_only_config(dir.path()), &store);
        let docs = [user("users/1", "Arek"), user("users/2", "Arek"), user("users/3", "Arek")];
        let mut batch = Batch::new();
        let mut etag = 0;
        for doc in docs {
            etag = store.put(doc.clone());
            batch.add_put(doc);
        }
        index.apply(batch, etag).unwrap();
        delete(&index, &store, "users/2");
        assert_eq!(names(&index, &["Arek"]), vec!["users/1", "users/3"]);
    }

    corrupt_newest_segment(dir.path());

    let index = open(first_flush_only_config(dir.path()), &store);
    assert!(index.recovery_report().restored());
    assert_eq!(names(&index, &["Arek"]), vec!["users/1", "users/3"]);
}

#[test]
fn recovered_index_matches_a_rebuild_from_scratch() {
    let recovered_dir = TempDir::new().unwrap();
    let scratch_dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(first_flush_only_config(recovered_dir.path()), &store);
        put(&index, &store, user("users/1", "Arek"));
        put(&index, &store, user("users/2", "Oren"));
        put(&index, &store, user("users/1", "Oren"));
        delete(&index, &store, "users/2");
        put(&index, &store, user("users/3", "Ayende"));
    }
    corrupt_newest_segment(recovered_dir.path());
    let recovered = open(first_flush_only_config(recovered_dir.path()), &store);

    let scratch = open(eager_config(scratch_dir.path()), &store);
    index_all(&scratch, &store);

    for name in ["Arek", "Oren", "Ayende"] {
        assert_eq!(names(&recovered, &[name]), names(&scratch, &[name]), "{}", name);
    }
    assert_eq!(recovered.durable_etag(), scratch.durable_etag());
}

#[test]
fn replaying_the_same_changes_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    let index = open(eager_config(dir.path()), &store);

    let doc = user("users/1", "Arek");
    let etag = store.put(doc.clone());
    index.apply(Batch::new().put(doc.clone()), etag).unwrap();
    index.apply(Batch::new().put(doc), etag).unwrap();

    assert_eq!(names(&index, &["Arek"]), vec!["users/1"]);
    assert_eq!(index.last_processed_etag(), etag);
}

#[test]
fn unreachable_store_fails_recovery() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(first_flush_only_config(dir.path()), &store);
        put(&index, &store, user("users/1", "One"));
        put(&index, &store, user("users/2", "Two"));
    }
    corrupt_newest_segment(dir.path());

    store.set_unreachable(true);
    let err = Index::open_with_clock(
        first_flush_only_config(dir.path()),
        durindex::analysis::keyword(),
        Arc::new(ManualClock::default()),
        &store,
    )
    .err()
    .unwrap();
    assert_eq!(err.kind, ErrorKind::RecoveryFailed);
}

#[test]
fn out_of_order_feed_fails_recovery() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(first_flush_only_config(dir.path()), &store);
        put(&index, &store, user("users/1", "One"));
        put(&index, &store, user("users/2", "Two"));
    }
    corrupt_newest_segment(dir.path());

    let feed = FixedFeed(vec![
        Change::put(user("users/2", "Two"), 3),
        Change::put(user("users/3", "Three"), 2),
    ]);
    let err = Index::open_with_clock(
        first_flush_only_config(dir.path()),
        durindex::analysis::keyword(),
        Arc::new(ManualClock::default()),
        &feed,
    )
    .err()
    .unwrap();
    assert_eq!(err.kind, ErrorKind::RecoveryFailed);
}

#[test]
fn clean_reopen_skips_replay() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(eager_config(dir.path()), &store);
        put(&index, &store, user("users/1", "Arek"));
        put(&index, &store, user("users/2", "Oren"));
    }

    // Changes the index never saw are left for the regular indexing loop
    store.put(user("users/3", "Ayende"));

    let index = open(eager_config(dir.path()), &store);
    let report = index.recovery_report();
    assert_eq!(report.transitions, vec![RecoveryState::Validating, RecoveryState::Ready]);
    assert_eq!(report.replayed_changes, 0);
    assert_eq!(report.resumed_etag, 2);
    assert_eq!(index.generation(), 2);
    assert!(names(&index, &["Ayende"]).is_empty());

    index_all(&index, &store);
    assert_eq!(names(&index, &["Ayende"]), vec!["users/3"]);
}

#[test]
fn fresh_directory_opens_empty() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    store.put(user("users/1", "Arek"));

    let index = open(eager_config(dir.path()), &store);
    let report = index.recovery_report();
    assert_eq!(report.transitions, vec![RecoveryState::Validating, RecoveryState::Ready]);
    assert_eq!(index.generation(), 0);
    assert!(index.commit_points().unwrap().is_empty());
}

#[test]
fn missing_segments_rebuild_from_commit_points() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(first_flush_only_config(dir.path()), &store);
        put(&index, &store, user("users/1", "One"));
        put(&index, &store, user("users/2", "Two"));
    }
    for entry in fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "seg") {
            fs::remove_file(path).unwrap();
        }
    }

    let index = open(first_flush_only_config(dir.path()), &store);
    assert!(index.recovery_report().restored());
    assert_eq!(names(&index, &["One", "Two"]), vec!["users/1", "users/2"]);
}

#[test]
fn damaged_commit_points_fall_back_to_an_empty_rebuild() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(first_flush_only_config(dir.path()), &store);
        put(&index, &store, user("users/1", "One"));
        put(&index, &store, user("users/2", "Two"));
        assert_eq!(index.generation(), 2);
    }
    corrupt_newest_segment(dir.path());
    corrupt_commit_point_copy(dir.path(), 1);

    let index = open(first_flush_only_config(dir.path()), &store);
    let report = index.recovery_report();
    assert!(report.restored());
    assert!(report.restored_from.is_none());
    assert_eq!(report.highest_generation, 2);
    assert_eq!(report.replayed_changes, 2);

    assert_eq!(names(&index, &["One", "Two"]), vec!["users/1", "users/2"]);
    assert_eq!(index.generation(), 3);

    // The rebuilt state is covered by a fresh commit point under a fresh id
    let points = index.commit_points().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!((points[0].id, points[0].generation, points[0].last_processed_etag), (2, 3, 2));

    let root = dir.path().join("CommitPoints");
    assert_eq!(
        dir_entries(&root),
        BTreeSet::from(["00000001.corrupt".to_string(), "00000002".to_string()])
    );
}

#[test]
fn damaged_newest_commit_point_falls_back_to_an_older_one() {
    let dir = TempDir::new().unwrap();
    let store = MemoryDocumentStore::new();
    {
        let index = open(eager_config(dir.path()), &store);
        put(&index, &store, user("users/1", "One"));
        put(&index, &store, user("users/2", "Two"));
        put(&index, &store, user("users/3", "Three"));
        assert_eq!(index.commit_points().unwrap().len(), 3);
    }
    corrupt_newest_segment(dir.path());
    corrupt_commit_point_copy(dir.path(), 3);

    let index = open(eager_config(dir.path()), &store);
    let report = index.recovery_report();
    let restored = report.restored_from.as_ref().unwrap();
    assert_eq!((restored.id, restored.generation), (2, 2));
    assert_eq!(report.replayed_changes, 1);

    assert_eq!(names(&index, &["One", "Two", "Three"]), vec!["users/1", "users/2", "users/3"]);
    assert_eq!(index.generation(), 4);

    let points = index.commit_points().unwrap();
    let ids: Vec<u64> = points.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2, 4]);
    assert!(points.windows(2).all(|pair| pair[0].generation < pair[1].generation));
    assert_eq!(points.last().unwrap().last_processed_etag, 3);

    // Nothing replayed twice after another reopen
    drop(index);
    let index = open(eager_config(dir.path()), &store);
    assert!(!index.recovery_report().restored());
    assert_eq!(index.generation(), 4);
}
