//! Integration tests for MVCC functionality
//!
//! Verifies versioning, snapshot isolation and determinism of reads.

use quadstore::iteration::collect_all;
use quadstore::{MemoryStore, NamedNode, QuadPattern, Statement, StoreConfig, StoreConnection};
use std::sync::{Arc, Barrier};
use std::thread;

fn nn(local: &str) -> NamedNode {
    NamedNode::new(&format!("http://example.org/{}", local)).unwrap()
}

fn sorted(conn: &StoreConnection, pattern: &QuadPattern) -> Vec<String> {
    let mut out: Vec<String> = collect_all(conn.get_statements(pattern, true).unwrap())
        .unwrap()
        .into_iter()
        .map(|st| st.to_string())
        .collect();
    out.sort();
    out
}

fn objects(conn: &StoreConnection, s: &str, p: &str) -> Vec<String> {
    let pattern = QuadPattern::new(Some(nn(s).into()), Some(nn(p)), None);
    let mut out: Vec<String> = collect_all(conn.get_statements(&pattern, false).unwrap())
        .unwrap()
        .into_iter()
        .map(|st| st.object.to_string())
        .collect();
    out.sort();
    out
}

#[test]
fn test_mvcc_snapshot_isolation() {
    let store = MemoryStore::new();
    let mut writer = store.connection();
    writer.add(&Statement::new(nn("acct"), nn("balance"), nn("v100"))).unwrap();

    let mut reader = store.connection();
    reader.begin().unwrap();
    let before = sorted(&reader, &QuadPattern::any());

    writer.begin().unwrap();
    writer
        .remove_statements(&QuadPattern::new(Some(nn("acct").into()), None, None))
        .unwrap();
    writer.add(&Statement::new(nn("acct"), nn("balance"), nn("v200"))).unwrap();
    writer.commit().unwrap();

    assert_eq!(sorted(&reader, &QuadPattern::any()), before);
    reader.commit().unwrap();
    assert_eq!(objects(&reader, "acct", "balance"), vec!["<http://example.org/v200>"]);
}

#[test]
fn test_scenario_remove_then_reclaim() {
    let store = MemoryStore::new();
    let mut writer = store.connection();

    writer.begin().unwrap();
    writer.add(&Statement::new(nn("s1"), nn("p1"), nn("o1"))).unwrap();
    writer.add(&Statement::new(nn("s1"), nn("p1"), nn("o2"))).unwrap();
    assert_eq!(writer.commit().unwrap(), Some(1));

    let mut r = store.connection();
    r.begin().unwrap();
    assert_eq!(r.snapshot(), Some(1));

    writer
        .remove_statements(&QuadPattern::new(
            Some(nn("s1").into()),
            Some(nn("p1")),
            Some(nn("o1").into()),
        ))
        .unwrap();
    assert_eq!(store.snapshots().committed(), 2);

    let mut r2 = store.connection();
    r2.begin().unwrap();
    assert_eq!(r2.snapshot(), Some(2));

    assert_eq!(
        objects(&r, "s1", "p1"),
        vec!["<http://example.org/o1>", "<http://example.org/o2>"]
    );
    assert_eq!(objects(&r2, "s1", "p1"), vec!["<http://example.org/o2>"]);

    // the removed statement stays linked while R can still see it
    assert_eq!(store.physical_statement_count(), 2);
    r.commit().unwrap();
    store.reclaim_below(2).unwrap();
    assert_eq!(store.physical_statement_count(), 1);
    assert!(store.lookup(&nn("o1").into()).is_none());

    assert_eq!(objects(&r2, "s1", "p1"), vec!["<http://example.org/o2>"]);
    r2.commit().unwrap();
}

#[test]
fn test_same_version_readers_agree() {
    let store = MemoryStore::with_config(StoreConfig::manual());
    let mut writer = store.connection();
    for i in 0..20 {
        writer
            .add(&Statement::new(nn(&format!("s{}", i % 4)), nn("p"), nn(&format!("o{}", i))))
            .unwrap();
    }

    let mut a = store.connection();
    let mut b = store.connection();
    a.begin().unwrap();
    writer
        .remove_statements(&QuadPattern::new(Some(nn("s1").into()), None, None))
        .unwrap();
    b.begin().unwrap();
    assert_ne!(a.snapshot(), b.snapshot());

    let mut c = store.connection();
    c.begin().unwrap();
    assert_eq!(b.snapshot(), c.snapshot());

    writer.add(&Statement::new(nn("late"), nn("p"), nn("o"))).unwrap();
    let pattern = QuadPattern::new(None, Some(nn("p")), None);
    assert_eq!(sorted(&b, &pattern), sorted(&c, &pattern));
    assert_eq!(sorted(&b, &pattern).len(), 15);
    assert_eq!(sorted(&a, &pattern).len(), 20);
}

#[test]
fn test_readers_on_threads_see_only_their_snapshot() {
    let store = MemoryStore::new();
    let mut writer = store.connection();
    for i in 0..50 {
        writer
            .add(&Statement::new(nn("s"), nn("p"), nn(&format!("o{}", i))))
            .unwrap();
    }

    let readers = 4;
    let barrier = Arc::new(Barrier::new(readers + 1));
    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut conn = store.connection();
                conn.begin().unwrap();
                let first = sorted(&conn, &QuadPattern::any());
                barrier.wait();
                for _ in 0..20 {
                    assert_eq!(sorted(&conn, &QuadPattern::any()), first);
                }
                conn.commit().unwrap();
                first.len()
            })
        })
        .collect();

    barrier.wait();
    for i in 0..50 {
        writer
            .remove_statements(&QuadPattern::new(None, None, Some(nn(&format!("o{}", i)).into())))
            .unwrap();
        writer
            .add(&Statement::new(nn("s"), nn("p"), nn(&format!("n{}", i))))
            .unwrap();
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 50);
    }
    assert_eq!(store.snapshots().pin_count(), 0);
    assert_eq!(objects(&writer, "s", "p").len(), 50);
}

#[test]
fn test_versions_are_monotonic() {
    let store = MemoryStore::new();
    let mut conn = store.connection();
    let mut last = store.snapshots().committed();
    for i in 0..10 {
        conn.add(&Statement::new(nn("s"), nn("p"), nn(&format!("o{}", i)))).unwrap();
        let now = store.snapshots().committed();
        assert!(now > last);
        last = now;
    }
}
