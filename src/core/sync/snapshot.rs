/*!
 * Snapshot Cell
 * Atomically swapped immutable snapshots for process-wide filter state
 */

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Atomically replaceable immutable snapshot
///
/// The tag filter table, the default filter, and the static-log handler list
/// are read on every emitted line but reconfigured rarely. Readers take an
/// atomic pointer load and never observe a partial update; writers build a
/// complete replacement and swap it in.
pub struct SnapshotCell<T> {
    inner: ArcSwap<T>,
}

impl<T> SnapshotCell<T> {
    /// Create a cell holding `value` as the initial snapshot
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            inner: ArcSwap::from_pointee(value),
        }
    }

    /// Current snapshot (lock-free, zero-contention)
    #[inline(always)]
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the snapshot wholesale
    #[inline]
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Build a replacement from the current snapshot and swap it in
    ///
    /// The closure may run more than once under write contention.
    #[inline]
    pub fn update<F>(&self, mut f: F)
    where
        F: FnMut(&T) -> T,
    {
        self.inner.rcu(|old| f(old));
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
