//! Shared live device state.

use std::sync::Arc;

use parking_lot::RwLock;

/// Device state shared by the poll loop, event listeners and readers.
///
/// Locks are taken only inside the closures passed to [`read`](Self::read)
/// and [`update`](Self::update), so a guard can never be held across an
/// `.await`.
#[derive(Debug)]
pub struct SharedStore<S> {
    inner: Arc<RwLock<S>>,
}

impl<S> SharedStore<S> {
    pub fn new(state: S) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Run `f` with shared access to the state.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` with exclusive access to the state.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> S
    where
        S: Clone,
    {
        self.inner.read().clone()
    }
}

impl<S: Default> Default for SharedStore<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
