//! Intersection of two iterations
//!
//! The right-hand side is drained into a working set before the first
//! element of the left-hand side is pulled; left elements found in the set
//! are emitted. With `distinct`, an emitted element is removed from the set
//! so it cannot be emitted again.

use super::{
    first_error, CloseableIteration, CollectionFactory, ElementSet, ElementSource,
    IterationResult, LookAheadIteration,
};
use std::hash::Hash;
use tracing::debug;

pub struct Intersect<A, B, T> {
    left: A,
    right: B,
    distinct: bool,
    include: Box<dyn ElementSet<T>>,
    initialized: bool,
}

impl<A, B, T> Intersect<A, B, T>
where
    A: CloseableIteration<Item = T>,
    B: CloseableIteration<Item = T>,
    T: Send,
{
    fn initialize(&mut self) -> IterationResult<()> {
        while self.right.has_next()? {
            self.include.insert(self.right.next()?);
        }
        self.initialized = true;
        debug!("Intersection working set holds {} elements", self.include.len());
        Ok(())
    }
}

impl<A, B, T> ElementSource for Intersect<A, B, T>
where
    A: CloseableIteration<Item = T>,
    B: CloseableIteration<Item = T>,
    T: Send,
{
    type Item = T;

    fn next_element(&mut self) -> IterationResult<Option<T>> {
        if !self.initialized {
            self.initialize()?;
        }
        while self.left.has_next()? {
            let element = self.left.next()?;
            let accepted = if self.distinct {
                self.include.remove(&element)
            } else {
                self.include.contains(&element)
            };
            if accepted {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    fn release(&mut self) -> IterationResult<()> {
        self.include.clear();
        let left = self.left.close();
        let right = self.right.close();
        first_error([left, right])
    }
}

/// Elements of `left` that also occur in `right`
pub type IntersectIteration<A, B, T> = LookAheadIteration<Intersect<A, B, T>>;

impl<A, B, T> LookAheadIteration<Intersect<A, B, T>>
where
    A: CloseableIteration<Item = T>,
    B: CloseableIteration<Item = T>,
    T: Send,
{
    /// Intersect using a caller-provided working set
    pub fn new(left: A, right: B, distinct: bool, include: Box<dyn ElementSet<T>>) -> Self {
        LookAheadIteration::from_source(Intersect {
            left,
            right,
            distinct,
            include,
            initialized: false,
        })
    }

    /// Intersect using a working set obtained from `factory`
    pub fn with_factory<C>(left: A, right: B, distinct: bool, factory: &C) -> Self
    where
        C: CollectionFactory,
        T: Hash + Eq + 'static,
    {
        Self::new(left, right, distinct, factory.create_set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iteration::{
        collect_all, ElementSource, IterationError, MemoryCollectionFactory, VecIteration,
    };

    struct FailingClose;

    impl ElementSource for FailingClose {
        type Item = u32;

        fn next_element(&mut self) -> IterationResult<Option<u32>> {
            Ok(Some(1))
        }

        fn release(&mut self) -> IterationResult<()> {
            Err(IterationError::Source("left refused to close".into()))
        }
    }

    #[test]
    fn test_intersect_keeps_common() {
        let iter = IntersectIteration::with_factory(
            VecIteration::new(vec![1, 2, 3, 4]),
            VecIteration::new(vec![4, 2, 9]),
            false,
            &MemoryCollectionFactory,
        );
        assert_eq!(collect_all(iter).unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_intersect_without_distinct_keeps_duplicates() {
        let iter = IntersectIteration::with_factory(
            VecIteration::new(vec![1, 1, 2]),
            VecIteration::new(vec![1]),
            false,
            &MemoryCollectionFactory,
        );
        assert_eq!(collect_all(iter).unwrap(), vec![1, 1]);
    }

    #[test]
    fn test_distinct_never_repeats() {
        let iter = IntersectIteration::with_factory(
            VecIteration::new(vec![7, 3, 7, 3]),
            VecIteration::new(vec![7, 7, 3, 3]),
            true,
            &MemoryCollectionFactory,
        );
        assert_eq!(collect_all(iter).unwrap(), vec![7, 3]);
    }

    #[test]
    fn test_close_attempts_both_sources() {
        let left = LookAheadIteration::from_source(FailingClose);
        let right = VecIteration::new(vec![1, 2]);
        let mut iter = IntersectIteration::with_factory(left, right, true, &MemoryCollectionFactory);

        let err = iter.close().unwrap_err();
        assert_eq!(err, IterationError::Source("left refused to close".into()));
        assert!(iter.is_closed());
        assert!(iter.source().right.is_closed());
    }
}
