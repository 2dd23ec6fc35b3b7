use quadstore::iteration::{
    collect_all, ConvertIteration, FilterIteration, IntersectIteration, MemoryCollectionFactory,
};
use quadstore::{
    CloseableIteration, MemoryStore, NamedNode, QuadPattern, Resource, Statement, StoreResult,
    TripleSource,
};

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Quadstore v{}", quadstore::version());
    println!("==========================================");
    println!();

    if let Err(e) = demo_snapshot_isolation() {
        eprintln!("Snapshot demo failed: {}", e);
    }
    if let Err(e) = demo_combinators() {
        eprintln!("Combinator demo failed: {}", e);
    }
}

fn ex(local: &str) -> NamedNode {
    NamedNode::new(&format!("http://example.org/{}", local)).expect("demo IRIs are valid")
}

fn demo_snapshot_isolation() -> StoreResult<()> {
    println!("=== Demo 1: Snapshot Isolation ===");
    let store = MemoryStore::new();
    let mut writer = store.connection();

    writer.begin()?;
    writer.add(&Statement::new(ex("s1"), ex("p1"), ex("o1")))?;
    writer.add(&Statement::new(ex("s1"), ex("p1"), ex("o2")))?;
    let v1 = writer.commit()?;
    println!("✓ Inserted two statements at version {:?}", v1);

    let mut r1 = store.connection();
    r1.begin()?;
    println!("✓ Reader R1 pinned version {:?}", r1.snapshot());

    writer.remove_statements(&QuadPattern::new(None, None, Some(ex("o1").into())))?;
    println!("✓ Removed (s1, p1, o1) at version {}", store.snapshots().committed());

    let mut r2 = store.connection();
    r2.begin()?;
    println!("✓ Reader R2 pinned version {:?}", r2.snapshot());

    let pattern = QuadPattern::new(Some(ex("s1").into()), Some(ex("p1")), None);
    for (name, reader) in [("R1", &r1), ("R2", &r2)] {
        let found = collect_all(reader.get_statements(&pattern, false)?)?;
        let objects: Vec<String> = found.iter().map(|st| st.object.to_string()).collect();
        println!("  {} sees: {}", name, objects.join(", "));
    }

    println!(
        "  Linked before R1 releases: {} statements",
        store.physical_statement_count()
    );
    r1.commit()?;
    r2.commit()?;
    println!(
        "✓ After both readers released: {} statements linked",
        store.physical_statement_count()
    );
    println!();
    Ok(())
}

fn demo_combinators() -> StoreResult<()> {
    println!("=== Demo 2: Iteration Combinators ===");
    let store = MemoryStore::new();
    let mut conn = store.connection();
    let knows = ex("knows");
    let likes = ex("likes");
    conn.add_all(vec![
        Statement::new(ex("alice"), knows.clone(), ex("bob")),
        Statement::new(ex("carol"), knows.clone(), ex("bob")),
        Statement::new(ex("alice"), likes.clone(), ex("tea")),
        Statement::new(ex("dave"), likes.clone(), ex("tea")),
    ])?;

    let subjects = |predicate: &NamedNode| -> StoreResult<_> {
        let pattern = QuadPattern::new(None, Some(predicate.clone()), None);
        let statements = conn.match_statements(&pattern)?;
        Ok(ConvertIteration::new(statements, |st: Statement| Ok(st.subject)))
    };

    let both = IntersectIteration::with_factory(
        subjects(&knows)?,
        subjects(&likes)?,
        true,
        &MemoryCollectionFactory,
    );
    let named: Vec<String> = collect_all(both)?.iter().map(|r| r.to_string()).collect();
    println!("✓ Knows someone and likes something: {}", named.join(", "));

    let alice: Resource = ex("alice").into();
    let mut not_alice = FilterIteration::new(subjects(&knows)?, move |r: &Resource| r != &alice);
    while not_alice.has_next()? {
        println!("  knows, not alice: {}", not_alice.next()?);
    }
    println!("✓ {} iterations still open", conn.open_iteration_count());
    Ok(())
}
