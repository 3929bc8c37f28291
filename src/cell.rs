use std::sync::Arc;

use parking_lot::Mutex;

/// Where a controller keeps the state it mutates.
///
/// Both methods return `None` once the owning view is gone; a reconciliation
/// that lands after that point is simply dropped.
pub trait StateCell<S> {
    fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R>;

    fn read<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R>;

    fn snapshot(&self) -> Option<S>
    where
        S: Clone,
    {
        self.read(S::clone)
    }
}

/// Plain shared cell for native front ends and tests. Never goes away.
#[derive(Debug, Default)]
pub struct Shared<S>(Arc<Mutex<S>>);

impl<S> Shared<S> {
    pub fn new(state: S) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn get(&self) -> S
    where
        S: Clone,
    {
        self.0.lock().clone()
    }
}

impl<S> Clone for Shared<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S> StateCell<S> for Shared<S> {
    fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        Some(f(&mut self.0.lock()))
    }

    fn read<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        Some(f(&self.0.lock()))
    }
}
