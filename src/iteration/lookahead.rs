//! Shared state machine behind every concrete iteration
//!
//! Concrete iterations implement [`ElementSource`] (produce the next element
//! or report the end, release resources) and are wrapped in a
//! [`LookAheadIteration`] which enforces the protocol: one-element
//! look-ahead, implicit close on exhaustion, idempotent close and a
//! last-resort close on drop.

use super::{CloseableIteration, IterationError, IterationResult};
use tracing::warn;

/// Producer of elements for a [`LookAheadIteration`]
pub trait ElementSource: Send {
    type Item: Send;

    /// Produce the next element, or `None` at the end.
    fn next_element(&mut self) -> IterationResult<Option<Self::Item>>;

    /// Release resources. Called exactly once.
    fn release(&mut self) -> IterationResult<()>;
}

/// Protocol state of an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    /// No element buffered yet
    Ready,
    /// An element is buffered and will be returned by `next()`
    HasMore,
    /// The source ran dry; resources released
    Exhausted,
    /// Closed before exhaustion; resources released
    Closed,
}

pub struct LookAheadIteration<S: ElementSource> {
    source: S,
    lookahead: Option<S::Item>,
    state: IterationState,
}

impl<S: ElementSource> LookAheadIteration<S> {
    pub fn from_source(source: S) -> Self {
        Self {
            source,
            lookahead: None,
            state: IterationState::Ready,
        }
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    /// Access to the wrapped source
    pub fn source(&self) -> &S {
        &self.source
    }

    fn release(&mut self, terminal: IterationState) -> IterationResult<()> {
        self.state = terminal;
        self.lookahead = None;
        self.source.release()
    }
}

impl<S: ElementSource> CloseableIteration for LookAheadIteration<S> {
    type Item = S::Item;

    fn has_next(&mut self) -> IterationResult<bool> {
        match self.state {
            IterationState::HasMore => Ok(true),
            IterationState::Exhausted | IterationState::Closed => Ok(false),
            IterationState::Ready => match self.source.next_element() {
                Ok(Some(element)) => {
                    self.lookahead = Some(element);
                    self.state = IterationState::HasMore;
                    Ok(true)
                }
                Ok(None) => {
                    self.release(IterationState::Exhausted)?;
                    Ok(false)
                }
                Err(e) => {
                    // never leave a failed iteration holding resources
                    if let Err(close_err) = self.release(IterationState::Closed) {
                        warn!("Close after source failure also failed: {}", close_err);
                    }
                    Err(e)
                }
            },
        }
    }

    fn next(&mut self) -> IterationResult<Self::Item> {
        match self.state {
            IterationState::Closed => Err(IterationError::Closed),
            IterationState::Exhausted => Err(IterationError::Exhausted),
            IterationState::Ready | IterationState::HasMore => {
                if !self.has_next()? {
                    return Err(IterationError::Exhausted);
                }
                self.state = IterationState::Ready;
                self.lookahead.take().ok_or(IterationError::Exhausted)
            }
        }
    }

    fn close(&mut self) -> IterationResult<()> {
        match self.state {
            IterationState::Exhausted | IterationState::Closed => Ok(()),
            IterationState::Ready | IterationState::HasMore => {
                self.release(IterationState::Closed)
            }
        }
    }

    fn is_closed(&self) -> bool {
        matches!(
            self.state,
            IterationState::Exhausted | IterationState::Closed
        )
    }
}

impl<S: ElementSource> Drop for LookAheadIteration<S> {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                warn!("Failed to close iteration on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        remaining: Vec<u32>,
        releases: Arc<AtomicUsize>,
        fail_release: bool,
    }

    impl ElementSource for Counting {
        type Item = u32;

        fn next_element(&mut self) -> IterationResult<Option<u32>> {
            Ok(self.remaining.pop())
        }

        fn release(&mut self) -> IterationResult<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                Err(IterationError::Source("release failed".into()))
            } else {
                Ok(())
            }
        }
    }

    fn counting(items: Vec<u32>) -> (LookAheadIteration<Counting>, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let iter = LookAheadIteration::from_source(Counting {
            remaining: items,
            releases: Arc::clone(&releases),
            fail_release: false,
        });
        (iter, releases)
    }

    #[test]
    fn test_drain_releases_once() {
        let (mut iter, releases) = counting(vec![2, 1]);
        assert_eq!(iter.state(), IterationState::Ready);
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.state(), IterationState::HasMore);
        assert_eq!(iter.next().unwrap(), 1);
        assert_eq!(iter.next().unwrap(), 2);
        assert!(!iter.has_next().unwrap());
        assert_eq!(iter.state(), IterationState::Exhausted);
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        assert_eq!(iter.next(), Err(IterationError::Exhausted));
        iter.close().unwrap();
        drop(iter);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_next_after_close_fails() {
        let (mut iter, releases) = counting(vec![1]);
        iter.close().unwrap();
        iter.close().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!iter.has_next().unwrap());
        assert_eq!(iter.next(), Err(IterationError::Closed));
    }

    #[test]
    fn test_next_without_probe() {
        let (mut iter, _) = counting(vec![5]);
        assert_eq!(iter.next().unwrap(), 5);
        assert_eq!(iter.next(), Err(IterationError::Exhausted));
    }

    #[test]
    fn test_drop_closes() {
        let (iter, releases) = counting(vec![1, 2, 3]);
        drop(iter);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_release_still_inert() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut iter = LookAheadIteration::from_source(Counting {
            remaining: vec![1],
            releases: Arc::clone(&releases),
            fail_release: true,
        });
        assert!(iter.close().is_err());
        assert!(iter.is_closed());
        assert!(iter.close().is_ok());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
