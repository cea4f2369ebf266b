//! Ordered observer registry with handle based removal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Handle returned by [`Subscribers::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Set of callbacks invoked in registration order
pub struct Subscribers<T> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns false if the handle was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Deliver `value` to every subscriber, returning how many were called.
    pub fn emit(&self, value: &T) -> usize {
        // Snapshot so callbacks may subscribe or unsubscribe without deadlocking.
        let snapshot: Vec<Callback<T>> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in &snapshot {
            callback(value);
        }
        snapshot.len()
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}
