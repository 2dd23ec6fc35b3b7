//! Pull-based iteration protocol with deterministic close semantics
//!
//! Every result the store hands out is a [`CloseableIteration`]: a
//! synchronous, blocking sequence that must eventually be closed so that the
//! resources behind it (most importantly a pinned snapshot) are released.
//!
//! # Lifecycle
//!
//! ```text
//!   Ready --has_next()--> HasMore --next()--> Ready
//!     |                                         |
//!     +--has_next() finds nothing--> Exhausted (released)
//!     |
//!     +--close()--> Closed (released)
//! ```
//!
//! - `has_next()` on a closed or exhausted iteration returns `false`.
//! - `next()` after exhaustion fails with [`IterationError::Exhausted`],
//!   after an explicit close with [`IterationError::Closed`].
//! - Reaching the end during a probe closes the iteration implicitly.
//! - `close()` is idempotent.
//!
//! Cancellation is closing before exhaustion. Derived iterations
//! ([`FilterIteration`], [`ConvertIteration`], [`IntersectIteration`]) own
//! their sources and close all of them when they are closed.

mod basic;
mod collection;
mod convert;
mod filter;
mod intersect;
mod lookahead;

pub use basic::{EmptyIteration, SingletonIteration, VecIteration};
pub use collection::{CollectionFactory, ElementSet, MemoryCollectionFactory};
pub use convert::{Convert, ConvertIteration};
pub use filter::{Filter, FilterIteration};
pub use intersect::{Intersect, IntersectIteration};
pub use lookahead::{ElementSource, IterationState, LookAheadIteration};

use thiserror::Error;
use tracing::warn;

/// Iteration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IterationError {
    /// Operation on an iteration that was closed explicitly
    #[error("The iteration has been closed")]
    Closed,

    /// `next()` called past the last element
    #[error("No more elements in the iteration")]
    Exhausted,

    /// The connection that produced this iteration is closed
    #[error("Iteration in use after its connection has been closed")]
    ConnectionClosed,

    /// A wrapped source failed
    #[error("Iteration source failed: {0}")]
    Source(String),

    /// The store rejected an operation issued on behalf of the iteration
    #[error("Store error: {0}")]
    Store(String),
}

pub type IterationResult<T> = Result<T, IterationError>;

/// A closeable, pull-based sequence of elements.
pub trait CloseableIteration: Send {
    type Item;

    /// Probe for another element. Never fails on a closed iteration.
    fn has_next(&mut self) -> IterationResult<bool>;

    /// Consume the next element.
    fn next(&mut self) -> IterationResult<Self::Item>;

    /// Release everything held by this iteration. Idempotent.
    fn close(&mut self) -> IterationResult<()>;

    fn is_closed(&self) -> bool;
}

impl<I: CloseableIteration + ?Sized> CloseableIteration for Box<I> {
    type Item = I::Item;

    fn has_next(&mut self) -> IterationResult<bool> {
        (**self).has_next()
    }

    fn next(&mut self) -> IterationResult<Self::Item> {
        (**self).next()
    }

    fn close(&mut self) -> IterationResult<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Type alias for boxed iterations
pub type BoxedIteration<T> = Box<dyn CloseableIteration<Item = T>>;

/// Drain an iteration into a vector and close it, also on error.
pub fn collect_all<I: CloseableIteration>(mut iter: I) -> IterationResult<Vec<I::Item>> {
    let mut out = Vec::new();
    let drained: IterationResult<()> = (|| {
        while iter.has_next()? {
            out.push(iter.next()?);
        }
        Ok(())
    })();
    let closed = iter.close();
    first_error([drained, closed])?;
    Ok(out)
}

/// Fold several close results into one: the first error is returned, the
/// remaining ones are logged.
///
/// Callers evaluate every close before calling this, so one failing source
/// never prevents the others from being released.
pub fn first_error<R>(results: R) -> IterationResult<()>
where
    R: IntoIterator<Item = IterationResult<()>>,
{
    let mut first = None;
    for result in results {
        if let Err(e) = result {
            if first.is_none() {
                first = Some(e);
            } else {
                warn!("Suppressed secondary close error: {}", e);
            }
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
