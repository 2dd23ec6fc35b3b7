//! Collections for intermediate results
//!
//! Set-based combinators do not allocate their working sets directly; they
//! take them from a [`CollectionFactory`]. The in-memory factory is the
//! default; a factory that spills past a size threshold can be plugged in
//! by implementing the same traits.

use rustc_hash::FxHashSet;
use std::hash::Hash;

/// A set of elements owned by one iteration
pub trait ElementSet<T>: Send {
    /// Returns `true` if the element was not present yet
    fn insert(&mut self, element: T) -> bool;

    fn contains(&self, element: &T) -> bool;

    /// Returns `true` if the element was present
    fn remove(&mut self, element: &T) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all elements and any backing storage
    fn clear(&mut self);
}

/// Creates working sets for combinator iterations
pub trait CollectionFactory: Send + Sync {
    fn create_set<T>(&self) -> Box<dyn ElementSet<T>>
    where
        T: Hash + Eq + Send + 'static;
}

/// Heap-backed set using the Fx hasher
#[derive(Debug)]
pub struct MemorySet<T> {
    elements: FxHashSet<T>,
}

impl<T: Hash + Eq + Send> ElementSet<T> for MemorySet<T> {
    fn insert(&mut self, element: T) -> bool {
        self.elements.insert(element)
    }

    fn contains(&self, element: &T) -> bool {
        self.elements.contains(element)
    }

    fn remove(&mut self, element: &T) -> bool {
        self.elements.remove(element)
    }

    fn len(&self) -> usize {
        self.elements.len()
    }

    fn clear(&mut self) {
        self.elements = FxHashSet::default();
    }
}

/// Factory producing purely in-memory sets
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryCollectionFactory;

impl CollectionFactory for MemoryCollectionFactory {
    fn create_set<T>(&self) -> Box<dyn ElementSet<T>>
    where
        T: Hash + Eq + Send + 'static,
    {
        Box::new(MemorySet {
            elements: FxHashSet::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set() {
        let mut set = MemoryCollectionFactory.create_set::<String>();
        assert!(set.insert("a".to_string()));
        assert!(!set.insert("a".to_string()));
        assert!(set.contains(&"a".to_string()));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&"a".to_string()));
        assert!(set.is_empty());
    }
}
