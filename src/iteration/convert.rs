//! Convert iteration: one-to-one transform of each pulled element

use super::{CloseableIteration, ElementSource, IterationResult, LookAheadIteration};

pub struct Convert<I, F> {
    inner: I,
    convert: F,
}

impl<I, F, T> ElementSource for Convert<I, F>
where
    I: CloseableIteration,
    F: FnMut(I::Item) -> IterationResult<T> + Send,
    T: Send,
{
    type Item = T;

    fn next_element(&mut self) -> IterationResult<Option<T>> {
        if self.inner.has_next()? {
            let element = self.inner.next()?;
            (self.convert)(element).map(Some)
        } else {
            Ok(None)
        }
    }

    fn release(&mut self) -> IterationResult<()> {
        self.inner.close()
    }
}

/// Iteration applying `convert` to every element of `inner`
pub type ConvertIteration<I, F> = LookAheadIteration<Convert<I, F>>;

impl<I, F, T> LookAheadIteration<Convert<I, F>>
where
    I: CloseableIteration,
    F: FnMut(I::Item) -> IterationResult<T> + Send,
    T: Send,
{
    pub fn new(inner: I, convert: F) -> Self {
        LookAheadIteration::from_source(Convert { inner, convert })
    }
}
