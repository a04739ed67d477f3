use core::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU64, Ordering},
};
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use fork_choice_store::Store;
use parking_lot::{Mutex, MutexGuard};
use types::preset::Preset;

/// The only way to mutate the fork choice store.
///
/// Mutations happen through [`StoreGuard`], which holds an exclusive lock. When the guard is
/// dropped the mutated store is published as the new snapshot. Readers use the snapshot and
/// never wait for the lock.
pub struct StoreLock<P: Preset> {
    store: Mutex<Store<P>>,
    snapshot: ArcSwap<Store<P>>,
    acquisitions: AtomicU64,
}

impl<P: Preset> StoreLock<P> {
    #[must_use]
    pub fn new(store: Store<P>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(store.clone()),
            store: Mutex::new(store),
            acquisitions: AtomicU64::new(0),
        }
    }

    pub fn lock(&self) -> StoreGuard<'_, P> {
        let guard = self.store.lock();

        self.acquisitions.fetch_add(1, Ordering::Relaxed);

        StoreGuard {
            guard,
            snapshot: &self.snapshot,
        }
    }

    /// A consistent view of the store as of the last released lock.
    pub fn snapshot(&self) -> Guard<Arc<Store<P>>> {
        self.snapshot.load()
    }

    #[must_use]
    pub fn owned_snapshot(&self) -> Arc<Store<P>> {
        self.snapshot.load_full()
    }

    /// Number of times [`Self::lock`] has been called.
    #[must_use]
    pub fn lock_acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

pub struct StoreGuard<'lock, P: Preset> {
    guard: MutexGuard<'lock, Store<P>>,
    snapshot: &'lock ArcSwap<Store<P>>,
}

impl<P: Preset> Deref for StoreGuard<'_, P> {
    type Target = Store<P>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<P: Preset> DerefMut for StoreGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<P: Preset> Drop for StoreGuard<'_, P> {
    fn drop(&mut self) {
        // Collections in `Store` are persistent, so this does not copy the tree.
        self.snapshot.store(Arc::new(self.guard.clone()));
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use fork_choice_store::StoreConfig;
    use types::{config::Config, preset::Minimal};

    use super::*;

    fn store_lock() -> Result<StoreLock<Minimal>> {
        let config = Arc::new(Config::minimal());
        let state = factory::min_genesis_state::<Minimal>(&config)?;
        let block = factory::genesis_block(&state);
        let store = Store::new(config, StoreConfig::default(), block, &state)?;
        Ok(StoreLock::new(store))
    }

    #[test]
    fn snapshot_is_published_when_guard_is_dropped() -> Result<()> {
        let store_lock = store_lock()?;

        {
            let mut store = store_lock.lock();
            store.apply_tick(5);

            assert_eq!(store_lock.snapshot().slot(), 0);
        }

        assert_eq!(store_lock.snapshot().slot(), 5);

        Ok(())
    }

    #[test]
    fn acquisitions_are_counted() -> Result<()> {
        let store_lock = store_lock()?;

        assert_eq!(store_lock.lock_acquisitions(), 0);

        drop(store_lock.lock());
        drop(store_lock.lock());
        let _snapshot = store_lock.snapshot();

        assert_eq!(store_lock.lock_acquisitions(), 2);

        Ok(())
    }
}
