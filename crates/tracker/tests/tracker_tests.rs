//! End-to-end tracker tests against the durable store.

use std::sync::{Arc, Barrier};
use std::thread;

use retrace_core::{CancelToken, Object, RevisionId, RevisionStore};
use retrace_store::{MemoryStore, RedbStore, StoreOptions};
use retrace_tracker::{warm_from_store, Tracker, TrackerConfig};
use serde_json::json;
use tempfile::TempDir;

fn obj(v: serde_json::Value) -> Object {
    v.as_object().cloned().expect("object literal")
}

fn new_tracker(dir: &TempDir, config: TrackerConfig, durable: bool) -> Tracker<RedbStore> {
    let store = RedbStore::open(dir.path().join("db.redb"), StoreOptions { durable }).unwrap();
    Tracker::new(Arc::new(store), config)
}

fn config_map(uid: &str, val: serde_json::Value) -> Object {
    obj(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"uid": uid, "namespace": "default", "name": "cm"},
        "data": {"val": val},
    }))
}

#[test]
fn test_s1_patch_round_trip() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
    let ctx = CancelToken::new();

    let rev0 = t.commit(&ctx, "u1", &obj(json!({"a": 1, "b": {"c": false}}))).unwrap();
    assert_eq!(rev0, RevisionId::new(0));

    let rev1 = t.commit(&ctx, "u1", &obj(json!({"a": 1, "b": {"c": true}}))).unwrap();
    assert_eq!(rev1, RevisionId::new(1));

    let record = t.store().get(&ctx, "u1", rev1).unwrap();
    let patch = record.as_patch().expect("rev 1 must be a patch");
    assert_eq!(patch.diff, obj(json!({"b": {"c": true}})));

    let restored = t.restore(&ctx, "u1", rev1).unwrap();
    assert_eq!(restored.object, obj(json!({"a": 1, "b": {"c": true}})));
    t.close();
}

#[test]
fn test_s2_scalar_change() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
    let ctx = CancelToken::new();

    let first = obj(json!({"a": 1, "b": {"c": false}}));
    let second = obj(json!({"a": 2, "b": {"c": false}}));

    t.commit(&ctx, "u1", &first).unwrap();
    let rev1 = t.commit(&ctx, "u1", &second).unwrap();

    let record = t.store().get(&ctx, "u1", rev1).unwrap();
    assert_eq!(record.as_patch().unwrap().diff, obj(json!({"a": 2})));

    assert_eq!(t.restore(&ctx, "u1", RevisionId::new(0)).unwrap().object, first);
    assert_eq!(t.restore(&ctx, "u1", rev1).unwrap().object, second);
    t.close();
}

#[test]
fn test_s3_deletion_and_addition_inside_submap() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
    let ctx = CancelToken::new();

    t.commit(&ctx, "u1", &obj(json!({"a": 1, "b": {"c": false}}))).unwrap();
    let rev1 = t.commit(&ctx, "u1", &obj(json!({"a": 1, "b": {"e": true}}))).unwrap();

    let record = t.store().get(&ctx, "u1", rev1).unwrap();
    assert_eq!(
        record.as_patch().unwrap().diff,
        obj(json!({"b": {"c": null, "e": true}}))
    );

    let restored = t.restore(&ctx, "u1", rev1).unwrap();
    assert_eq!(restored.object, obj(json!({"a": 1, "b": {"e": true}})));
    t.close();
}

#[test]
fn test_s4_top_level_deletion() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
    let ctx = CancelToken::new();

    t.commit(&ctx, "u1", &obj(json!({"a": 1, "b": {"c": false}}))).unwrap();
    let rev1 = t.commit(&ctx, "u1", &obj(json!({"b": {"c": false}}))).unwrap();

    let record = t.store().get(&ctx, "u1", rev1).unwrap();
    assert_eq!(record.as_patch().unwrap().diff, obj(json!({"a": null})));

    let restored = t.restore(&ctx, "u1", rev1).unwrap();
    assert_eq!(restored.object, obj(json!({"b": {"c": false}})));
    t.close();
}

#[test]
fn test_s5_snapshot_cadence_at_k4() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
    let ctx = CancelToken::new();

    for i in 0..4u64 {
        let rev = t.commit(&ctx, "u1", &config_map("u1", json!(format!("x{i}")))).unwrap();
        assert_eq!(rev.as_u64(), i);
    }

    // revisions 0 and 3 are snapshots, 1 and 2 are patches
    for (rev, want_snapshot) in [(0u64, true), (1, false), (2, false), (3, true)] {
        let record = t.store().get(&ctx, "u1", RevisionId::new(rev)).unwrap();
        assert_eq!(
            record.is_snapshot(),
            want_snapshot,
            "revision {rev} kind mismatch"
        );
    }

    // restoring rev 2 applies patches 1 and 2 onto the rev-0 snapshot
    let restored = t.restore(&ctx, "u1", RevisionId::new(2)).unwrap();
    assert_eq!(restored.object, config_map("u1", json!("x2")));
    t.close();
}

#[test]
fn test_snapshot_cadence_across_many_revisions() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
    let ctx = CancelToken::new();

    for i in 0..12u64 {
        t.commit(&ctx, "u1", &config_map("u1", json!(i))).unwrap();
    }
    for rev in 0..12u64 {
        let want_snapshot = rev == 0 || rev % 4 == 3;
        let record = t.store().get(&ctx, "u1", RevisionId::new(rev)).unwrap();
        assert_eq!(record.is_snapshot(), want_snapshot, "revision {rev}");
    }
    t.close();
}

#[test]
fn test_restore_soundness_every_revision() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
    let ctx = CancelToken::new();

    let mut committed = Vec::new();
    for i in 0..10u64 {
        let object = obj(json!({
            "metadata": {"uid": "u1"},
            "spec": {"replicas": i, "labels": {"tier": if i % 2 == 0 {"a"} else {"b"}}},
        }));
        t.commit(&ctx, "u1", &object).unwrap();
        committed.push(object);
    }

    for (rev, want) in committed.iter().enumerate() {
        let restored = t.restore(&ctx, "u1", RevisionId::new(rev as u64)).unwrap();
        assert_eq!(&restored.object, want, "revision {rev}");
        assert_eq!(restored.id, RevisionId::new(rev as u64));
    }
    t.close();
}

#[test]
fn test_duplicate_resource_version_is_suppressed() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(8), true);
    let ctx = CancelToken::new();

    let object = obj(json!({"metadata": {"uid": "u1", "resourceVersion": "100"}, "v": 1}));
    let rev0 = t.commit(&ctx, "u1", &object).unwrap();

    let err = t.commit(&ctx, "u1", &object.clone()).unwrap_err();
    match err {
        retrace_core::Error::DuplicateResourceVersion { rev, resource_version } => {
            assert_eq!(rev, rev0);
            assert_eq!(resource_version, "100");
        }
        other => panic!("expected duplicate error, got {other}"),
    }

    // exactly one revision exists
    assert_eq!(
        t.store().latest_revision(&ctx, "u1").unwrap(),
        RevisionId::new(0)
    );

    // a new resource version commits fine
    let next = obj(json!({"metadata": {"uid": "u1", "resourceVersion": "101"}, "v": 2}));
    assert_eq!(t.commit(&ctx, "u1", &next).unwrap(), RevisionId::new(1));
    t.close();
}

#[test]
fn test_duplicate_suppression_works_without_cache() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::without_cache(8), true);
    let ctx = CancelToken::new();

    let object = obj(json!({"metadata": {"uid": "u1", "resourceVersion": "7"}}));
    t.commit(&ctx, "u1", &object).unwrap();
    assert!(t.commit(&ctx, "u1", &object.clone()).unwrap_err().is_duplicate());
    t.close();
}

#[test]
fn test_s6_concurrent_stress() {
    let dir = TempDir::new().unwrap();
    let t = Arc::new(new_tracker(
        &dir,
        TrackerConfig::with_snapshot_interval(8),
        false,
    ));

    const WORKERS: usize = 12;
    const LOOPS: usize = 40;

    let barrier = Arc::new(Barrier::new(WORKERS));
    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let t = Arc::clone(&t);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let ctx = CancelToken::new();
            barrier.wait();
            for i in 0..LOOPS {
                let object = config_map("uid-conc", json!(worker * 100 + i));
                t.commit(&ctx, "uid-conc", &object).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let ctx = CancelToken::new();
    let latest = t.store().latest_revision(&ctx, "uid-conc").unwrap();
    assert_eq!(latest.as_u64(), (WORKERS * LOOPS - 1) as u64);

    // the chain is intact: the final revision restores to *some* worker's
    // last write, and every prior revision restores without error
    let restored = t.restore(&ctx, "uid-conc", latest).unwrap();
    let val = restored.object["data"]["val"].as_i64().unwrap();
    assert!((0..(WORKERS * 100 + LOOPS) as i64).contains(&val));

    for rev in (0..latest.as_u64()).step_by(37) {
        t.restore(&ctx, "uid-conc", RevisionId::new(rev)).unwrap();
    }

    t.close();
    t.store().close().unwrap();
}

#[test]
fn test_parallel_uids_do_not_interfere() {
    let dir = TempDir::new().unwrap();
    let t = Arc::new(new_tracker(
        &dir,
        TrackerConfig::with_snapshot_interval(4),
        false,
    ));

    let mut handles = Vec::new();
    for worker in 0..8 {
        let t = Arc::clone(&t);
        handles.push(thread::spawn(move || {
            let ctx = CancelToken::new();
            let uid = format!("uid-{worker}");
            for i in 0..25u64 {
                let rev = t.commit(&ctx, &uid, &config_map(&uid, json!(i))).unwrap();
                assert_eq!(rev.as_u64(), i, "per-uid ids stay dense");
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    t.close();
}

#[test]
fn test_restore_from_old_revision_does_not_poison_cache() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
    let ctx = CancelToken::new();

    for i in 0..5u64 {
        t.commit(&ctx, "u1", &config_map("u1", json!(i))).unwrap();
    }

    // materialize an old revision, then keep committing
    let old = t.restore(&ctx, "u1", RevisionId::new(1)).unwrap();
    assert_eq!(old.object, config_map("u1", json!(1)));

    let rev = t.commit(&ctx, "u1", &config_map("u1", json!(5))).unwrap();
    assert_eq!(rev.as_u64(), 5);
    let latest = t.restore(&ctx, "u1", rev).unwrap();
    assert_eq!(latest.object, config_map("u1", json!(5)));
    t.close();
}

#[test]
fn test_cancelled_commit_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);

    let cancelled = CancelToken::new();
    cancelled.cancel();
    assert!(t
        .commit(&cancelled, "u1", &config_map("u1", json!(0)))
        .unwrap_err()
        .is_cancelled());

    let ctx = CancelToken::new();
    assert!(t
        .store()
        .latest_revision(&ctx, "u1")
        .unwrap_err()
        .is_not_found());
    t.close();
}

#[test]
fn test_cold_start_replay_rebuilds_final_state() {
    let dir = TempDir::new().unwrap();
    let ctx = CancelToken::new();

    let mut finals = Vec::new();
    {
        let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(4), true);
        for uid_n in 0..3 {
            let uid = format!("uid-{uid_n}");
            let mut last = Object::new();
            for i in 0..7u64 {
                last = config_map(&uid, json!(uid_n * 10 + i));
                t.commit(&ctx, &uid, &last).unwrap();
            }
            finals.push((uid, last));
        }
        t.close();
        t.store().close().unwrap();
    }

    // reopen: walk the store, warm the cache, verify state matches
    let store = RedbStore::open(dir.path().join("db.redb"), StoreOptions::default()).unwrap();
    let t = Tracker::new(Arc::new(store), TrackerConfig::with_snapshot_interval(4));
    let stats = warm_from_store(&ctx, t.store().as_ref(), &t).unwrap();
    assert_eq!(stats.objects, 3);
    assert_eq!(stats.revisions, 21);

    for (uid, want) in &finals {
        let restored = t
            .restore(&ctx, uid, t.store().latest_revision(&ctx, uid).unwrap())
            .unwrap();
        assert_eq!(&restored.object, want, "uid {uid}");
    }

    // commits continue where the chain left off
    let rev = t.commit(&ctx, "uid-0", &config_map("uid-0", json!(99))).unwrap();
    assert_eq!(rev.as_u64(), 7);
    t.close();
}

#[test]
fn test_restore_cost_is_bounded_by_interval() {
    // A store wrapper that counts get() calls would be heavier than the
    // property needs: with K=4 the farthest revision from its base
    // snapshot is 3 patches away, so restore touches at most 4 records.
    // Verify via the memory store by counting walk order instead.
    let store = Arc::new(MemoryStore::new());
    let t = Tracker::new(Arc::clone(&store), TrackerConfig::with_snapshot_interval(4));
    let ctx = CancelToken::new();

    for i in 0..10u64 {
        t.commit(&ctx, "u1", &config_map("u1", json!(i))).unwrap();
    }

    // every revision's distance to its base snapshot is at most K-1
    for rev in 0..10u64 {
        let mut cur = rev;
        let mut hops = 0;
        loop {
            let record = store.get(&ctx, "u1", RevisionId::new(cur)).unwrap();
            if record.is_snapshot() {
                break;
            }
            cur = record.previous_id().as_u64();
            hops += 1;
        }
        assert!(hops <= 3, "revision {rev} is {hops} patches from its base");
    }
    t.close();
}

#[test]
fn test_empty_diff_still_commits_a_revision() {
    let dir = TempDir::new().unwrap();
    let t = new_tracker(&dir, TrackerConfig::with_snapshot_interval(8), true);
    let ctx = CancelToken::new();

    // no resourceVersion, identical bodies: the diff is empty but the
    // observation is still recorded
    let object = obj(json!({"metadata": {"uid": "u1"}, "v": 1}));
    t.commit(&ctx, "u1", &object).unwrap();
    let rev1 = t.commit(&ctx, "u1", &object.clone()).unwrap();
    assert_eq!(rev1.as_u64(), 1);

    let record = t.store().get(&ctx, "u1", rev1).unwrap();
    assert!(record.as_patch().unwrap().diff.is_empty());
    assert_eq!(t.restore(&ctx, "u1", rev1).unwrap().object, object);
    t.close();
}
