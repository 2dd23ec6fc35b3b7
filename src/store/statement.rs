//! Versioned statement record and statement lists

use super::value::{Role, ValueId};
use super::Version;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Removal stamp of a statement that is still live
pub const NOT_REMOVED: Version = Version::MAX;

/// Identifier of a statement inside its index
pub type StatementId = u64;

/// The atomic record of the store.
///
/// Everything except the removal stamp is fixed at creation. The stamp is
/// written at most once and is read without locks, so it lives in an atomic
/// published with release/acquire ordering. The explicit flag may only
/// change while the statement's version is still unpublished.
#[derive(Debug)]
pub struct MemStatement {
    id: StatementId,
    subject: ValueId,
    predicate: ValueId,
    object: ValueId,
    context: Option<ValueId>,
    added: Version,
    removed: AtomicU64,
    explicit: AtomicBool,
}

impl MemStatement {
    pub(crate) fn new(
        id: StatementId,
        subject: ValueId,
        predicate: ValueId,
        object: ValueId,
        context: Option<ValueId>,
        explicit: bool,
        added: Version,
    ) -> Self {
        Self {
            id,
            subject,
            predicate,
            object,
            context,
            added,
            removed: AtomicU64::new(NOT_REMOVED),
            explicit: AtomicBool::new(explicit),
        }
    }

    pub fn id(&self) -> StatementId {
        self.id
    }

    pub fn subject(&self) -> ValueId {
        self.subject
    }

    pub fn predicate(&self) -> ValueId {
        self.predicate
    }

    pub fn object(&self) -> ValueId {
        self.object
    }

    pub fn context(&self) -> Option<ValueId> {
        self.context
    }

    /// Value in the given role, if any
    pub fn value(&self, role: Role) -> Option<ValueId> {
        match role {
            Role::Subject => Some(self.subject),
            Role::Predicate => Some(self.predicate),
            Role::Object => Some(self.object),
            Role::Context => self.context,
        }
    }

    pub fn added_version(&self) -> Version {
        self.added
    }

    /// Version at which the statement was removed, if it was
    pub fn removed_version(&self) -> Option<Version> {
        match self.removed.load(Ordering::Acquire) {
            NOT_REMOVED => None,
            v => Some(v),
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit.load(Ordering::Acquire)
    }

    /// Turn an inferred statement explicit. Only valid while the version it
    /// was added at is unpublished, so no reader can have seen the change.
    pub(crate) fn promote_to_explicit(&self) {
        self.explicit.store(true, Ordering::Release);
    }

    /// Visible to a reader pinned at `snapshot`
    #[inline]
    pub fn is_visible(&self, snapshot: Version) -> bool {
        self.added <= snapshot && self.removed.load(Ordering::Acquire) > snapshot
    }

    /// Not yet stamped as removed
    #[inline]
    pub fn is_live(&self) -> bool {
        self.removed.load(Ordering::Acquire) == NOT_REMOVED
    }

    /// Can be unlinked once no snapshot at or below `horizon` is pinned
    pub(crate) fn is_reclaimable(&self, horizon: Version) -> bool {
        self.removed.load(Ordering::Acquire) <= horizon
    }

    /// Stamp the statement removed at `version`.
    ///
    /// Returns `false` if it was already stamped or if `version` does not
    /// come after the creation version.
    pub(crate) fn mark_removed(&self, version: Version) -> bool {
        if version <= self.added || version == NOT_REMOVED {
            return false;
        }
        self.removed
            .compare_exchange(NOT_REMOVED, version, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Undo a removal stamp written at `version`
    pub(crate) fn unmark_removed(&self, version: Version) -> bool {
        self.removed
            .compare_exchange(version, NOT_REMOVED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn same_quad(
        &self,
        subject: ValueId,
        predicate: ValueId,
        object: ValueId,
        context: Option<ValueId>,
    ) -> bool {
        self.subject == subject
            && self.predicate == predicate
            && self.object == object
            && self.context == context
    }
}

/// Capacity of the first segment; each following segment doubles it
const FIRST_SEGMENT: usize = 8;

/// Fixed-capacity block of statement slots, filled front to back
#[derive(Debug)]
struct Segment {
    slots: Box<[OnceLock<Arc<MemStatement>>]>,
}

impl Segment {
    fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
        })
    }
}

/// Segment and offset of list position `index`
#[inline]
fn locate(index: usize) -> (usize, usize) {
    let block = index / FIRST_SEGMENT + 1;
    let segment = (usize::BITS - 1 - block.leading_zeros()) as usize;
    (segment, index - FIRST_SEGMENT * ((1 << segment) - 1))
}

fn slot(segments: &[Arc<Segment>], len: usize, index: usize) -> Option<&Arc<MemStatement>> {
    if index >= len {
        return None;
    }
    let (segment, offset) = locate(index);
    segments.get(segment)?.slots.get(offset)?.get()
}

/// Per-value, per-role list of statements.
///
/// Append-only between sweeps. Storage is a chain of segments, each twice
/// the size of the one before; an append fills the next free slot of the
/// tail segment and never moves existing entries. Readers take a
/// [`FrozenList`], which shares the segments and remembers the length at
/// the time it was taken. Reclamation replaces a list with a compacted copy
/// and leaves the old segments to the frozen lists still holding them.
#[derive(Debug, Default)]
pub struct StatementList {
    segments: Arc<Vec<Arc<Segment>>>,
    len: usize,
}

impl StatementList {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&Arc<MemStatement>> {
        slot(&self.segments, self.len, index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MemStatement>> + '_ {
        (0..self.len).filter_map(move |index| self.get(index))
    }

    /// Append `statement`. Only the segment directory is ever copied, when a
    /// frozen list shares it and a new segment has to be added.
    pub(crate) fn push(&mut self, statement: Arc<MemStatement>) {
        let (segment, offset) = locate(self.len);
        if segment == self.segments.len() {
            Arc::make_mut(&mut self.segments).push(Segment::with_capacity(FIRST_SEGMENT << segment));
        }
        // slots at or past `len` have never been handed to a reader
        let _ = self.segments[segment].slots[offset].set(statement);
        self.len += 1;
    }

    /// View of the current contents that later appends do not change
    pub fn freeze(&self) -> FrozenList {
        FrozenList {
            segments: Arc::clone(&self.segments),
            len: self.len,
        }
    }

    /// Drop every entry for which `keep` is false. A list that keeps
    /// everything is left as it is. Returns the number of dropped entries.
    pub(crate) fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&MemStatement) -> bool,
    {
        if self.iter().all(|st| keep(&**st)) {
            return 0;
        }
        let mut compacted = StatementList::default();
        for st in self.iter() {
            if keep(&**st) {
                compacted.push(Arc::clone(st));
            }
        }
        let dropped = self.len - compacted.len;
        *self = compacted;
        dropped
    }
}

/// Statement list as it was when frozen
#[derive(Debug, Clone, Default)]
pub struct FrozenList {
    segments: Arc<Vec<Arc<Segment>>>,
    len: usize,
}

impl FrozenList {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&Arc<MemStatement>> {
        slot(&self.segments, self.len, index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MemStatement>> + '_ {
        (0..self.len).filter_map(move |index| self.get(index))
    }
}
