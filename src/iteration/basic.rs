//! Leaf iterations over in-memory data

use super::{ElementSource, IterationResult, LookAheadIteration};
use std::collections::VecDeque;

/// Source over an owned buffer
pub struct Buffered<T> {
    items: VecDeque<T>,
}

impl<T: Send> ElementSource for Buffered<T> {
    type Item = T;

    fn next_element(&mut self) -> IterationResult<Option<T>> {
        Ok(self.items.pop_front())
    }

    fn release(&mut self) -> IterationResult<()> {
        self.items.clear();
        Ok(())
    }
}

/// Iteration over the elements of a vector, in order
pub type VecIteration<T> = LookAheadIteration<Buffered<T>>;

impl<T: Send> VecIteration<T> {
    pub fn new(items: Vec<T>) -> Self {
        LookAheadIteration::from_source(Buffered {
            items: items.into(),
        })
    }
}

/// Iteration yielding exactly one element
pub type SingletonIteration<T> = VecIteration<T>;

impl<T: Send> LookAheadIteration<Buffered<T>> {
    pub fn singleton(item: T) -> Self {
        Self::new(vec![item])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// Iteration with no elements
pub type EmptyIteration<T> = VecIteration<T>;
