//! Filter iteration: passes through only the elements a predicate accepts

use super::{CloseableIteration, ElementSource, IterationResult, LookAheadIteration};

pub struct Filter<I, F> {
    inner: I,
    predicate: F,
}

impl<I, F> ElementSource for Filter<I, F>
where
    I: CloseableIteration,
    I::Item: Send,
    F: FnMut(&I::Item) -> bool + Send,
{
    type Item = I::Item;

    fn next_element(&mut self) -> IterationResult<Option<I::Item>> {
        while self.inner.has_next()? {
            let element = self.inner.next()?;
            if (self.predicate)(&element) {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    fn release(&mut self) -> IterationResult<()> {
        self.inner.close()
    }
}

/// Iteration over the elements of `inner` accepted by `predicate`.
/// Rejected elements are never exposed.
pub type FilterIteration<I, F> = LookAheadIteration<Filter<I, F>>;

impl<I, F> LookAheadIteration<Filter<I, F>>
where
    I: CloseableIteration,
    I::Item: Send,
    F: FnMut(&I::Item) -> bool + Send,
{
    pub fn new(inner: I, predicate: F) -> Self {
        LookAheadIteration::from_source(Filter { inner, predicate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iteration::{collect_all, IterationError, VecIteration};

    #[test]
    fn test_filter_skips_rejected() {
        let iter = FilterIteration::new(VecIteration::new(vec![1, 2, 3, 4, 5]), |x: &i32| x % 2 == 1);
        assert_eq!(collect_all(iter).unwrap(), vec![1, 3, 5]);
    }

    #[test]
    fn test_filter_rejecting_everything() {
        let mut iter = FilterIteration::new(VecIteration::new(vec![2, 4]), |x: &i32| *x > 10);
        assert!(!iter.has_next().unwrap());
        assert_eq!(iter.next(), Err(IterationError::Exhausted));
    }

    #[test]
    fn test_close_closes_source() {
        let mut iter = FilterIteration::new(VecIteration::new(vec![1, 2]), |_: &i32| true);
        iter.close().unwrap();
        assert!(iter.source().inner.is_closed());
    }
}
