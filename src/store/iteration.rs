//! Iteration over the statements visible in one snapshot

use super::index::StatementPattern;
use super::snapshot::SnapshotPin;
use super::statement::{FrozenList, MemStatement};
use super::Version;
use crate::iteration::{ElementSource, IterationError, IterationResult, LookAheadIteration};
use std::sync::Arc;

/// Walks a frozen statement list and yields the entries that are visible
/// at the snapshot and match the pattern.
///
/// Holds its own pin on the snapshot; releasing the source drops the list
/// and the pin together.
pub struct StatementSource {
    statements: FrozenList,
    position: usize,
    pattern: StatementPattern,
    snapshot: Version,
    pin: Option<SnapshotPin>,
}

impl ElementSource for StatementSource {
    type Item = Arc<MemStatement>;

    fn next_element(&mut self) -> IterationResult<Option<Arc<MemStatement>>> {
        while let Some(st) = self.statements.get(self.position) {
            self.position += 1;
            if st.is_visible(self.snapshot) && self.pattern.matches(st) {
                return Ok(Some(Arc::clone(st)));
            }
        }
        Ok(None)
    }

    fn release(&mut self) -> IterationResult<()> {
        self.statements = FrozenList::default();
        match self.pin.take() {
            Some(mut pin) => pin
                .release()
                .map_err(|e| IterationError::Store(e.to_string())),
            None => Ok(()),
        }
    }
}

/// Statements of one snapshot matching a pattern
pub type StatementIteration = LookAheadIteration<StatementSource>;

impl LookAheadIteration<StatementSource> {
    /// Iterate `statements` as seen by the snapshot `pin` holds
    pub fn new(statements: FrozenList, pattern: StatementPattern, pin: SnapshotPin) -> Self {
        LookAheadIteration::from_source(StatementSource {
            statements,
            position: 0,
            pattern,
            snapshot: pin.version(),
            pin: Some(pin),
        })
    }

    /// Iteration that yields nothing but still owns `pin` until closed
    pub fn nothing(pin: SnapshotPin) -> Self {
        Self::new(FrozenList::default(), StatementPattern::default(), pin)
    }

    /// Snapshot this iteration reads
    pub fn snapshot(&self) -> Version {
        self.source().snapshot
    }

    /// Whether the iteration still holds its snapshot pin
    pub fn holds_pin(&self) -> bool {
        self.source().pin.is_some()
    }
}

#[cfg(test)]
mod tests {
    use crate::iteration::{collect_all, CloseableIteration};
    use crate::store::{MemoryStore, StatementPattern, StoreConfig};
    use crate::rdf::{NamedNode, Statement};

    fn nn(s: &str) -> NamedNode {
        NamedNode::new(&format!("http://example.org/{}", s)).unwrap()
    }

    #[test]
    fn test_drained_iteration_releases_pin() {
        let store = MemoryStore::with_config(StoreConfig::manual());
        let mut conn = store.connection();
        conn.add(&Statement::new(nn("s"), nn("p"), nn("o"))).unwrap();

        let mut iter = store.statements(StatementPattern::default()).unwrap();
        assert!(iter.holds_pin());
        assert_eq!(store.snapshots().pin_count(), 1);

        assert!(iter.has_next().unwrap());
        iter.next().unwrap();
        assert!(!iter.has_next().unwrap());
        assert!(!iter.holds_pin());
        assert_eq!(store.snapshots().pin_count(), 0);
    }

    #[test]
    fn test_close_releases_pin_once() {
        let store = MemoryStore::new();
        let mut iter = store.statements(StatementPattern::default()).unwrap();
        iter.close().unwrap();
        iter.close().unwrap();
        assert_eq!(store.snapshots().pin_count(), 0);
    }

    #[test]
    fn test_snapshot_is_fixed() {
        let store = MemoryStore::with_config(StoreConfig::manual());
        let mut conn = store.connection();
        conn.add(&Statement::new(nn("s"), nn("p"), nn("o1"))).unwrap();

        let iter = store.statements(StatementPattern::default()).unwrap();
        assert_eq!(iter.snapshot(), 1);
        conn.add(&Statement::new(nn("s"), nn("p"), nn("o2"))).unwrap();

        assert_eq!(collect_all(iter).unwrap().len(), 1);
        let later = store.statements(StatementPattern::default()).unwrap();
        assert_eq!(collect_all(later).unwrap().len(), 2);
    }
}
