//! Connection lifecycle: iteration tracking, forced close, pin release

use quadstore::iteration::{collect_all, IntersectIteration, MemoryCollectionFactory};
use quadstore::{
    CloseableIteration, ConvertIteration, IterationError, MemoryStore, NamedNode, QuadPattern,
    Resource, Statement, StoreConfig, StoreError, TripleSource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn nn(local: &str) -> NamedNode {
    NamedNode::new(&format!("http://example.org/{}", local)).unwrap()
}

fn populated() -> MemoryStore {
    let store = MemoryStore::with_config(StoreConfig::manual());
    let mut conn = store.connection();
    conn.add_all((0..5).map(|i| Statement::new(nn("s"), nn("p"), nn(&format!("o{}", i)))))
        .unwrap();
    store
}

#[test]
fn test_closing_connection_closes_its_iterations() {
    let store = populated();
    let mut conn = store.connection();

    let mut iterations: Vec<_> = (0..3)
        .map(|_| conn.get_statements(&QuadPattern::any(), true).unwrap())
        .collect();
    assert!(iterations[0].has_next().unwrap());
    iterations[1].next().unwrap();
    assert_eq!(conn.open_iteration_count(), 3);
    assert_eq!(store.snapshots().pin_count(), 3);

    conn.close().unwrap();

    assert_eq!(store.snapshots().pin_count(), 0);
    for iter in iterations.iter_mut() {
        assert!(iter.is_closed());
        assert_eq!(iter.next(), Err(IterationError::ConnectionClosed));
        assert_eq!(iter.has_next(), Err(IterationError::ConnectionClosed));
        assert!(iter.close().is_ok());
    }
}

#[test]
fn test_drained_iteration_releases_pin_without_close() {
    let store = populated();
    let conn = store.connection();
    let mut iter = conn.get_statements(&QuadPattern::any(), true).unwrap();

    let mut seen = 0;
    while iter.has_next().unwrap() {
        iter.next().unwrap();
        seen += 1;
    }
    assert_eq!(seen, 5);
    assert_eq!(store.snapshots().pin_count(), 0);
    assert_eq!(conn.open_iteration_count(), 0);
    assert_eq!(iter.next(), Err(IterationError::Exhausted));
}

#[test]
fn test_second_close_is_noop() {
    let store = populated();
    let conn = store.connection();
    let mut iter = conn.get_statements(&QuadPattern::any(), true).unwrap();
    iter.close().unwrap();
    iter.close().unwrap();
    assert_eq!(store.snapshots().pin_count(), 0);
    assert!(!iter.has_next().unwrap());
    assert_eq!(iter.next(), Err(IterationError::Closed));
}

#[test]
fn test_dropped_iteration_and_connection_release_everything() {
    let store = populated();
    {
        let mut conn = store.connection();
        conn.begin().unwrap();
        let _open = conn.get_statements(&QuadPattern::any(), true).unwrap();
        assert_eq!(store.snapshots().pin_count(), 2);
    }
    assert_eq!(store.snapshots().pin_count(), 0);
}

#[test]
fn test_closed_connection_rejects_operations() {
    let store = populated();
    let mut conn = store.connection();
    conn.close().unwrap();
    assert!(!conn.is_open());
    assert!(matches!(
        conn.get_statements(&QuadPattern::any(), true),
        Err(StoreError::ConnectionClosed)
    ));
    assert!(matches!(conn.begin(), Err(StoreError::ConnectionClosed)));
    assert!(conn.close().is_ok());
}

#[test]
fn test_triple_source_feeds_intersection() {
    let store = MemoryStore::new();
    let mut conn = store.connection();
    conn.add_all(vec![
        Statement::new(nn("alice"), nn("knows"), nn("bob")),
        Statement::new(nn("carol"), nn("knows"), nn("bob")),
        Statement::new(nn("alice"), nn("knows"), nn("dave")),
        Statement::new(nn("alice"), nn("likes"), nn("tea")),
        Statement::new(nn("erin"), nn("likes"), nn("tea")),
    ])
    .unwrap();

    let subjects = |p: &str| {
        let statements = conn
            .match_statements(&QuadPattern::new(None, Some(nn(p)), None))
            .unwrap();
        ConvertIteration::new(statements, |st: Statement| Ok(st.subject))
    };

    let both = IntersectIteration::with_factory(
        subjects("knows"),
        subjects("likes"),
        true,
        &MemoryCollectionFactory,
    );
    let alice: Resource = nn("alice").into();
    assert_eq!(collect_all(both).unwrap(), vec![alice]);
    assert_eq!(conn.open_iteration_count(), 0);
    assert_eq!(store.snapshots().pin_count(), 0);
}

#[test]
fn test_intersection_close_releases_both_sides() {
    let store = populated();
    let conn = store.connection();
    let left = conn.get_statements(&QuadPattern::any(), true).unwrap();
    let right = conn.get_statements(&QuadPattern::any(), true).unwrap();
    let mut both = IntersectIteration::with_factory(left, right, true, &MemoryCollectionFactory);

    assert!(both.has_next().unwrap());
    both.close().unwrap();
    assert_eq!(conn.open_iteration_count(), 0);
    assert_eq!(store.snapshots().pin_count(), 0);
}

#[test]
fn test_next_only_drain_releases_tracking() {
    let store = populated();
    let conn = store.connection();
    let mut iter = conn.get_statements(&QuadPattern::any(), true).unwrap();

    let mut seen = 0;
    loop {
        match iter.next() {
            Ok(_) => seen += 1,
            Err(IterationError::Exhausted) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(seen, 5);
    assert_eq!(conn.open_iteration_count(), 0);
    assert_eq!(store.snapshots().pin_count(), 0);
}

#[test]
fn test_contexts_listed_while_removals_commit() {
    let store = MemoryStore::new();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = store.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut conn = store.connection();
            for i in 0..500 {
                let graph: Resource = nn(&format!("g{}", i)).into();
                conn.add(&Statement::new(nn("s"), nn("p"), nn("o")).in_context(graph.clone()))
                    .unwrap();
                conn.clear(&[Some(graph)]).unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let reader = store.connection();
    while !done.load(Ordering::Acquire) {
        let contexts = collect_all(reader.contexts().unwrap()).unwrap();
        assert!(contexts.len() <= 1);
    }
    writer.join().unwrap();

    assert!(collect_all(reader.contexts().unwrap()).unwrap().is_empty());
    assert_eq!(store.snapshots().pin_count(), 0);
}
