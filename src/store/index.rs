//! Statement index
//!
//! Every statement is linked into the list of its subject, predicate and
//! object (and context, if it has one) plus a list of all statements.
//! Lookups choose the most selective bound position and filter the frozen
//! list they get back.
//!
//! Writers append and stamp removals; only reclamation unlinks. Readers take
//! the lock just long enough to freeze the list they need, and an append
//! holds the write lock only for the slot it fills.

use super::registry::ValueRegistry;
use super::statement::{FrozenList, MemStatement, StatementId, StatementList};
use super::value::{MemValue, Role, StoreId, ValueId};
use super::{StoreError, StoreResult, Version};
use crate::rdf::{QuadPattern, Resource};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Context restriction of a pattern
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContextFilter {
    #[default]
    Any,
    /// Only these contexts; `None` is the default graph
    Only(Vec<Option<ValueId>>),
}

impl ContextFilter {
    pub fn accepts(&self, context: Option<ValueId>) -> bool {
        match self {
            ContextFilter::Any => true,
            ContextFilter::Only(contexts) => contexts.contains(&context),
        }
    }

    fn single_named(&self) -> Option<ValueId> {
        match self {
            ContextFilter::Only(contexts) if contexts.len() == 1 => contexts[0],
            _ => None,
        }
    }
}

/// Pattern over interned values; `None` positions are wildcards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementPattern {
    pub subject: Option<ValueId>,
    pub predicate: Option<ValueId>,
    pub object: Option<ValueId>,
    pub contexts: ContextFilter,
    /// `Some(true)` explicit only, `Some(false)` inferred only
    pub explicit: Option<bool>,
}

impl StatementPattern {
    pub fn matches(&self, st: &MemStatement) -> bool {
        self.subject.map_or(true, |s| s == st.subject())
            && self.predicate.map_or(true, |p| p == st.predicate())
            && self.object.map_or(true, |o| o == st.object())
            && self.contexts.accepts(st.context())
            && self.explicit.map_or(true, |e| e == st.is_explicit())
    }
}

/// Pattern over structural values, resolved against the registry at the
/// moment it is used. An empty `contexts` list means any context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuePattern {
    pub subject: Option<MemValue>,
    pub predicate: Option<MemValue>,
    pub object: Option<MemValue>,
    pub contexts: Vec<Option<MemValue>>,
    pub explicit: Option<bool>,
}

impl ValuePattern {
    /// Build from a term-level pattern. Inferred statements are matched only
    /// when `include_inferred` is set.
    pub fn from_quad_pattern(pattern: &QuadPattern, include_inferred: bool) -> Self {
        Self {
            subject: pattern.subject.as_ref().map(MemValue::from),
            predicate: pattern.predicate.as_ref().map(MemValue::from),
            object: pattern.object.as_ref().map(MemValue::from),
            contexts: pattern
                .contexts
                .iter()
                .map(|c| c.as_ref().map(MemValue::from))
                .collect(),
            explicit: if include_inferred { None } else { Some(true) },
        }
    }

    pub fn for_contexts(contexts: &[Option<Resource>], explicit: Option<bool>) -> Self {
        Self {
            contexts: contexts
                .iter()
                .map(|c| c.as_ref().map(MemValue::from))
                .collect(),
            explicit,
            ..Self::default()
        }
    }

    /// Whether a quad given by value matches
    pub fn matches_values(
        &self,
        subject: &MemValue,
        predicate: &MemValue,
        object: &MemValue,
        context: Option<&MemValue>,
    ) -> bool {
        self.subject.as_ref().map_or(true, |s| s == subject)
            && self.predicate.as_ref().map_or(true, |p| p == predicate)
            && self.object.as_ref().map_or(true, |o| o == object)
            && (self.contexts.is_empty() || self.contexts.iter().any(|c| c.as_ref() == context))
    }
}

/// Outcome of one reclamation sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Versions at or below this were eligible
    pub horizon: Version,
    pub statements_unlinked: usize,
    pub values_evicted: usize,
}

#[derive(Debug)]
struct IndexInner {
    registry: ValueRegistry,
    all: StatementList,
}

impl IndexInner {
    fn resolve_pattern(&self, pattern: &ValuePattern) -> Option<StatementPattern> {
        let bound = |value: &Option<MemValue>| match value {
            Some(v) => self.registry.lookup(v).map(Some),
            None => Some(None),
        };
        let subject = bound(&pattern.subject)?;
        let predicate = bound(&pattern.predicate)?;
        let object = bound(&pattern.object)?;

        let contexts = if pattern.contexts.is_empty() {
            ContextFilter::Any
        } else {
            let known: Vec<Option<ValueId>> = pattern
                .contexts
                .iter()
                .filter_map(|c| match c {
                    Some(v) => self.registry.lookup(v).map(Some),
                    None => Some(None),
                })
                .collect();
            if known.is_empty() {
                return None;
            }
            ContextFilter::Only(known)
        };

        Some(StatementPattern {
            subject,
            predicate,
            object,
            contexts,
            explicit: pattern.explicit,
        })
    }

    /// Most selective list for `pattern`: subject, object, predicate, a
    /// single named context, then everything.
    fn candidates(&self, pattern: &StatementPattern) -> StoreResult<FrozenList> {
        let bound = [
            (pattern.subject, Role::Subject),
            (pattern.object, Role::Object),
            (pattern.predicate, Role::Predicate),
            (pattern.contexts.single_named(), Role::Context),
        ];
        for (id, role) in bound {
            if let Some(id) = id {
                return self.registry.list(id, role);
            }
        }
        Ok(self.all.freeze())
    }

    fn validate(&self, pattern: &StatementPattern) -> StoreResult<()> {
        let contexts = match &pattern.contexts {
            ContextFilter::Any => Vec::new(),
            ContextFilter::Only(contexts) => contexts.iter().flatten().copied().collect(),
        };
        for id in [pattern.subject, pattern.predicate, pattern.object]
            .into_iter()
            .flatten()
            .chain(contexts)
        {
            self.registry.resolve(id)?;
        }
        Ok(())
    }
}

/// Four-role statement index over one value registry
#[derive(Debug)]
pub struct StatementIndex {
    inner: RwLock<IndexInner>,
    next_statement_id: AtomicU64,
    pending_removals: AtomicUsize,
}

impl StatementIndex {
    pub fn new(store: StoreId) -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                registry: ValueRegistry::new(store),
                all: StatementList::default(),
            }),
            next_statement_id: AtomicU64::new(1),
            pending_removals: AtomicUsize::new(0),
        }
    }

    pub fn intern(&self, value: MemValue) -> ValueId {
        self.inner.write().registry.intern(value)
    }

    pub fn lookup(&self, value: &MemValue) -> Option<ValueId> {
        self.inner.read().registry.lookup(value)
    }

    pub fn resolve(&self, id: ValueId) -> StoreResult<MemValue> {
        self.inner.read().registry.resolve(id).cloned()
    }

    /// Resolve the four positions of a statement under one lock
    pub fn resolve_quad(
        &self,
        st: &MemStatement,
    ) -> StoreResult<(MemValue, MemValue, MemValue, Option<MemValue>)> {
        let inner = self.inner.read();
        let registry = &inner.registry;
        let context = match st.context() {
            Some(c) => Some(registry.resolve(c)?.clone()),
            None => None,
        };
        Ok((
            registry.resolve(st.subject())?.clone(),
            registry.resolve(st.predicate())?.clone(),
            registry.resolve(st.object())?.clone(),
            context,
        ))
    }

    /// Append a statement created at `version` to every list it belongs to.
    ///
    /// Returns `false` when an equivalent statement is already live: one
    /// with the same flag, or an explicit one when adding an inferred
    /// statement. An explicit statement supersedes a live inferred one,
    /// which is stamped removed at `version`, or turned explicit in place
    /// when it was added at `version` itself.
    pub fn add_statement(
        &self,
        subject: &MemValue,
        predicate: &MemValue,
        object: &MemValue,
        context: Option<&MemValue>,
        explicit: bool,
        version: Version,
    ) -> StoreResult<bool> {
        subject.check_role(Role::Subject)?;
        predicate.check_role(Role::Predicate)?;
        object.check_role(Role::Object)?;
        if let Some(c) = context {
            c.check_role(Role::Context)?;
        }

        let mut inner = self.inner.write();
        let registry = &mut inner.registry;
        let s = registry.intern(subject.clone());
        let p = registry.intern(predicate.clone());
        let o = registry.intern(object.clone());
        let c = context.map(|c| registry.intern(c.clone()));

        let mut shortest = registry.list(s, Role::Subject)?;
        for (id, role) in [(p, Role::Predicate), (o, Role::Object)] {
            let list = registry.list(id, role)?;
            if list.len() < shortest.len() {
                shortest = list;
            }
        }
        for existing in shortest.iter() {
            if !existing.is_live() || !existing.same_quad(s, p, o, c) {
                continue;
            }
            if existing.is_explicit() || !explicit {
                return Ok(false);
            }
            if existing.added_version() == version {
                existing.promote_to_explicit();
                debug!("Inferred statement {} made explicit at version {}", existing.id(), version);
                return Ok(true);
            }
            if existing.mark_removed(version) {
                self.pending_removals.fetch_add(1, Ordering::Relaxed);
                debug!("Inferred statement {} superseded at version {}", existing.id(), version);
            }
        }

        let id: StatementId = self.next_statement_id.fetch_add(1, Ordering::Relaxed);
        let st = Arc::new(MemStatement::new(id, s, p, o, c, explicit, version));
        registry.link(s, Role::Subject, Arc::clone(&st))?;
        registry.link(p, Role::Predicate, Arc::clone(&st))?;
        registry.link(o, Role::Object, Arc::clone(&st))?;
        if let Some(c) = c {
            registry.link(c, Role::Context, Arc::clone(&st))?;
        }
        inner.all.push(st);
        Ok(true)
    }

    /// Stamp every live statement matching `pattern` as removed at
    /// `version`. Nothing is unlinked. Returns the number of stamped
    /// statements.
    pub fn remove_matching(&self, pattern: &ValuePattern, version: Version) -> StoreResult<usize> {
        let (resolved, candidates) = {
            let inner = self.inner.read();
            match inner.resolve_pattern(pattern) {
                Some(resolved) => {
                    let candidates = inner.candidates(&resolved)?;
                    (resolved, candidates)
                }
                None => return Ok(0),
            }
        };

        let mut stamped = 0;
        for st in candidates.iter() {
            if st.is_live() && resolved.matches(st) && st.mark_removed(version) {
                stamped += 1;
            }
        }
        if stamped > 0 {
            self.pending_removals.fetch_add(stamped, Ordering::Relaxed);
            debug!("Stamped {} statements removed at version {}", stamped, version);
        }
        Ok(stamped)
    }

    /// Candidate list and resolved pattern for a value-level pattern.
    /// `None` when a bound value is not interned, so nothing can match.
    pub fn select(&self, pattern: &ValuePattern) -> StoreResult<Option<(StatementPattern, FrozenList)>> {
        let inner = self.inner.read();
        match inner.resolve_pattern(pattern) {
            Some(resolved) => {
                let candidates = inner.candidates(&resolved)?;
                Ok(Some((resolved, candidates)))
            }
            None => Ok(None),
        }
    }

    /// Candidate list for a handle-level pattern. Fails on handles that
    /// this store did not mint or that were evicted.
    pub fn candidates(&self, pattern: &StatementPattern) -> StoreResult<FrozenList> {
        let inner = self.inner.read();
        inner.validate(pattern)?;
        inner.candidates(pattern)
    }

    /// Unlink every statement whose removal version is at or below
    /// `horizon`. The caller must guarantee that no snapshot at or below
    /// `horizon` is pinned.
    pub(crate) fn unlink_removed(&self, horizon: Version, compact_values: bool) -> ReclaimStats {
        let mut inner = self.inner.write();

        let unlinked = inner.all.retain(|st| !st.is_reclaimable(horizon));
        inner
            .registry
            .retain_statements(|st| !st.is_reclaimable(horizon));

        let evicted = if compact_values {
            inner.registry.evict_unreferenced()
        } else {
            0
        };

        let _ = self
            .pending_removals
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |pending| {
                Some(pending.saturating_sub(unlinked))
            });

        ReclaimStats {
            horizon,
            statements_unlinked: unlinked,
            values_evicted: evicted,
        }
    }

    /// Take back everything a failed write did at `version`: removal
    /// stamps are cleared and statements added at `version` are unlinked.
    /// The version must not have been published.
    pub(crate) fn discard_version(&self, version: Version) {
        let mut inner = self.inner.write();

        let restored = inner
            .all
            .iter()
            .filter(|st| st.unmark_removed(version))
            .count();
        let dropped = inner.all.retain(|st| st.added_version() != version);
        inner
            .registry
            .retain_statements(|st| st.added_version() != version);

        if restored > 0 {
            let _ = self
                .pending_removals
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |pending| {
                    Some(pending.saturating_sub(restored))
                });
        }
        debug!(
            "Discarded version {}: {} stamps cleared, {} statements unlinked",
            version, restored, dropped
        );
    }

    /// Statements still linked, visible or not
    pub fn physical_len(&self) -> usize {
        self.inner.read().all.len()
    }

    pub fn value_count(&self) -> usize {
        self.inner.read().registry.len()
    }

    /// Statements stamped removed but not yet unlinked
    pub fn pending_removals(&self) -> usize {
        self.pending_removals.load(Ordering::Relaxed)
    }
}
