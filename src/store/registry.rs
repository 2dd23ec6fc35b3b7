//! Value registry: interning of atomic values
//!
//! Every structurally distinct value gets one slot. The slot also owns the
//! value's four statement lists (one per [`Role`]), which makes the
//! registry the storage behind the per-role indexes.
//!
//! The registry is not synchronized itself; the statement index owns it
//! behind its lock, so interning is serialized and equal values can never
//! end up with two live handles.

use super::statement::{FrozenList, MemStatement, StatementList};
use super::value::{MemValue, Role, StoreId, ValueId};
use super::{StoreError, StoreResult};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct ValueEntry {
    value: MemValue,
    lists: [StatementList; 4],
}

impl ValueEntry {
    fn new(value: MemValue) -> Self {
        Self {
            value,
            lists: Default::default(),
        }
    }

    fn is_unreferenced(&self) -> bool {
        self.lists.iter().all(|list| list.is_empty())
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<ValueEntry>,
}

/// Interned values of one store
#[derive(Debug)]
pub struct ValueRegistry {
    store: StoreId,
    lookup: FxHashMap<MemValue, u32>,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ValueRegistry {
    pub fn new(store: StoreId) -> Self {
        Self {
            store,
            lookup: FxHashMap::default(),
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Handle for `value`, allocating a slot on first reference
    pub fn intern(&mut self, value: MemValue) -> ValueId {
        if let Some(&index) = self.lookup.get(&value) {
            return self.id_at(index);
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        self.lookup.insert(value.clone(), index);
        self.slots[index as usize].entry = Some(ValueEntry::new(value));
        self.id_at(index)
    }

    /// Handle for `value` if it is currently interned
    pub fn lookup(&self, value: &MemValue) -> Option<ValueId> {
        self.lookup.get(value).map(|&index| self.id_at(index))
    }

    pub fn resolve(&self, id: ValueId) -> StoreResult<&MemValue> {
        self.entry(id).map(|entry| &entry.value)
    }

    /// Frozen view of the statement list of `id` in `role`
    pub fn list(&self, id: ValueId, role: Role) -> StoreResult<FrozenList> {
        self.entry(id).map(|entry| entry.lists[role.slot()].freeze())
    }

    pub(crate) fn link(&mut self, id: ValueId, role: Role, statement: Arc<MemStatement>) -> StoreResult<()> {
        self.entry_mut(id)?.lists[role.slot()].push(statement);
        Ok(())
    }

    /// Drop every list entry for which `keep` is false. Lists without such
    /// entries are left untouched.
    pub(crate) fn retain_statements<F>(&mut self, mut keep: F)
    where
        F: FnMut(&MemStatement) -> bool,
    {
        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            for list in entry.lists.iter_mut() {
                list.retain(&mut keep);
            }
        }
    }

    /// Evict values that no statement list refers to any more. Returns the
    /// number of evicted values.
    pub(crate) fn evict_unreferenced(&mut self) -> usize {
        let mut evicted = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let unreferenced = slot
                .entry
                .as_ref()
                .map(ValueEntry::is_unreferenced)
                .unwrap_or(false);
            if !unreferenced {
                continue;
            }
            if let Some(entry) = slot.entry.take() {
                self.lookup.remove(&entry.value);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!("Evicted {} unreferenced values from {}", evicted, self.store);
        }
        evicted
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    fn id_at(&self, index: u32) -> ValueId {
        ValueId {
            store: self.store,
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn check_owner(&self, id: ValueId) -> StoreResult<()> {
        if id.store != self.store {
            return Err(StoreError::ForeignValue {
                value: id,
                store: self.store,
            });
        }
        Ok(())
    }

    fn entry(&self, id: ValueId) -> StoreResult<&ValueEntry> {
        self.check_owner(id)?;
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(StoreError::UnknownValue(id))
    }

    fn entry_mut(&mut self, id: ValueId) -> StoreResult<&mut ValueEntry> {
        self.check_owner(id)?;
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(StoreError::UnknownValue(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> MemValue {
        MemValue::Iri(format!("http://example.org/{}", s))
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut registry = ValueRegistry::new(StoreId::next());
        let a = registry.intern(iri("a"));
        let b = registry.intern(iri("b"));
        assert_ne!(a, b);
        assert_eq!(registry.intern(iri("a")), a);
        assert_eq!(registry.lookup(&iri("a")), Some(a));
        assert_eq!(registry.resolve(a).unwrap(), &iri("a"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut first = ValueRegistry::new(StoreId::next());
        let second = ValueRegistry::new(StoreId::next());
        let id = first.intern(iri("a"));
        assert!(matches!(second.resolve(id), Err(StoreError::ForeignValue { .. })));
    }

    #[test]
    fn test_evicted_slot_reuse_does_not_alias() {
        let mut registry = ValueRegistry::new(StoreId::next());
        let old = registry.intern(iri("gone"));
        assert_eq!(registry.evict_unreferenced(), 1);
        assert!(registry.is_empty());

        let new = registry.intern(iri("fresh"));
        assert_eq!(new.index, old.index);
        assert_ne!(new, old);
        assert!(matches!(registry.resolve(old), Err(StoreError::UnknownValue(_))));
        assert_eq!(registry.resolve(new).unwrap(), &iri("fresh"));
    }

    #[test]
    fn test_referenced_values_survive_eviction() {
        let mut registry = ValueRegistry::new(StoreId::next());
        let s = registry.intern(iri("s"));
        let p = registry.intern(iri("p"));
        let o = registry.intern(iri("o"));
        let st = Arc::new(MemStatement::new(1, s, p, o, None, true, 1));
        registry.link(s, Role::Subject, Arc::clone(&st)).unwrap();

        assert_eq!(registry.evict_unreferenced(), 2);
        assert!(registry.resolve(s).is_ok());
        assert_eq!(registry.list(s, Role::Subject).unwrap().len(), 1);
    }
}
