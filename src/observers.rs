use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Thread-safe list of listeners. Registries and connections keep their
/// observers in one of these so that listeners may be added or removed from
/// one thread while notifications fire from another.
///
/// Notification goes through `snapshot()`: callers iterate a copy, so an
/// observer may remove itself (or others) from inside its callback.
pub struct Observers<T: ?Sized> {
    list: Mutex<Vec<Arc<T>>>,
}

impl<T: ?Sized> Observers<T> {
    pub fn new() -> Self {
        Observers {
            list: Mutex::new(Vec::new()),
        }
    }

    /// Register `observer`. Registering the same Arc twice is a no-op.
    pub fn add(&self, observer: Arc<T>) {
        let mut list = self.lock();
        if !list.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            list.push(observer);
        }
    }

    /// Unregister `observer`. Returns false if it was not registered.
    pub fn remove(&self, observer: &Arc<T>) -> bool {
        let mut list = self.lock();
        let before = list.len();
        list.retain(|o| !Arc::ptr_eq(o, observer));
        list.len() != before
    }

    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // a panicking observer must not take the whole list down with it
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<T>>> {
        self.list.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ?Sized> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Observers({})", self.len())
    }
}
