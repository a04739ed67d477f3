use core::time::Duration;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use im::{HashMap, OrdMap};
use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use std_ext::ArcExt as _;
use thiserror::Error;
use types::{
    combined::BeaconState,
    phase0::primitives::{Slot, H256},
    traits::BeaconState as _,
};

type StateMap = OrdMap<Slot, Arc<BeaconState>>;
type StateMapLock = Arc<Mutex<StateMap>>;

#[derive(Debug, Error)]
pub enum CacheLockError {
    #[error("could not obtain state cache lock in {} ms", timeout.as_millis())]
    CacheLockTimeout { timeout: Duration },
    #[error(
        "could not obtain state cache lock in {} ms with block root {block_root:?}",
        timeout.as_millis()
    )]
    StateMapLockTimeout { block_root: H256, timeout: Duration },
}

/// States indexed by the root of the latest block applied to them and by slot.
///
/// A block root maps to its post-state and to any states produced by processing empty slots on
/// top of it. Each root has its own lock so that states for unrelated blocks can be computed
/// concurrently. Locks are acquired with a timeout and fail with [`CacheLockError`].
pub struct StateCache {
    cache: Mutex<HashMap<H256, StateMapLock>>,
    try_lock_timeout: Duration,
}

impl StateCache {
    #[must_use]
    pub fn new(try_lock_timeout: Duration) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            try_lock_timeout,
        }
    }

    /// Returns the latest cached state for `block_root` with a slot not greater than `slot`.
    pub fn before_or_at_slot(
        &self,
        block_root: H256,
        slot: Slot,
    ) -> Result<Option<Arc<BeaconState>>> {
        let Some(state_map_lock) = self.get_by_root(block_root)? else {
            return Ok(None);
        };

        let state = self
            .try_lock_map(&state_map_lock, block_root)?
            .get_prev(&slot)
            .map(|(_, state)| state.clone_arc());

        Ok(state)
    }

    /// Returns the cached state for `block_root` with the lowest slot.
    ///
    /// Every other state for the same root is derived from it by processing empty slots, so this
    /// is the post-state of the block if it has been cached.
    pub fn earliest(&self, block_root: H256) -> Result<Option<Arc<BeaconState>>> {
        let Some(state_map_lock) = self.get_by_root(block_root)? else {
            return Ok(None);
        };

        let state = self
            .try_lock_map(&state_map_lock, block_root)?
            .get_min()
            .map(|(_, state)| state.clone_arc());

        Ok(state)
    }

    /// Returns the state for `block_root` at exactly `slot`, computing it with `f` if needed.
    ///
    /// `f` receives the latest cached state before `slot`, if any. The state it returns is
    /// cached. If a lock cannot be obtained in time, `f` is called without caching the result.
    pub fn get_or_insert_with(
        &self,
        block_root: H256,
        slot: Slot,
        f: impl FnOnce(Option<&Arc<BeaconState>>) -> Result<Arc<BeaconState>>,
    ) -> Result<Arc<BeaconState>> {
        let state_map_lock = match self.get_or_init_by_root(block_root) {
            Ok(lock) => lock,
            Err(error) if error.is::<CacheLockError>() => return f(None),
            Err(error) => return Err(error),
        };

        let mut state_map = match self.try_lock_map(&state_map_lock, block_root) {
            Ok(guard) => guard,
            Err(error) if error.is::<CacheLockError>() => return f(None),
            Err(error) => return Err(error),
        };

        let pre_state = state_map.get_prev(&slot).map(|(_, state)| state);

        if let Some(state) = pre_state {
            if state.slot() == slot {
                return Ok(state.clone_arc());
            }
        }

        let post_state = f(pre_state)?;

        state_map.insert(post_state.slot(), post_state.clone_arc());

        Ok(post_state)
    }

    pub fn insert(&self, block_root: H256, state: Arc<BeaconState>) -> Result<()> {
        let state_map_lock = self.get_or_init_by_root(block_root)?;

        self.try_lock_map(&state_map_lock, block_root)?
            .insert(state.slot(), state);

        Ok(())
    }

    pub fn contains(&self, block_root: H256) -> Result<bool> {
        Ok(self.get_by_root(block_root)?.is_some())
    }

    pub fn len(&self) -> Result<usize> {
        self.all_state_map_locks()?
            .into_iter()
            .map(|(block_root, state_map_lock)| -> Result<usize> {
                Ok(self.try_lock_map(&state_map_lock, block_root)?.len())
            })
            .sum()
    }

    /// Drops all states with slots lower than `finalized_slot`.
    pub fn prune(&self, finalized_slot: Slot) -> Result<()> {
        for (block_root, state_map_lock) in self.all_state_map_locks()? {
            let mut state_map = self.try_lock_map(&state_map_lock, block_root)?;
            let (_, state_at_slot, mut retained) = state_map.split_lookup(&finalized_slot);

            if let Some(state) = state_at_slot {
                retained.insert(finalized_slot, state);
            }

            let pruned = state_map.len() - retained.len();

            *state_map = retained;

            if pruned > 0 {
                debug!("pruned {pruned} states for block {block_root:?} from state cache");
            }
        }

        self.try_lock_cache()?.retain(|block_root, state_map_lock| {
            self.try_lock_map(state_map_lock, *block_root)
                .ok()
                .is_some_and(|state_map| !state_map.is_empty())
        });

        Ok(())
    }

    fn all_state_map_locks(&self) -> Result<Vec<(H256, StateMapLock)>> {
        let locks = self
            .try_lock_cache()?
            .iter()
            .map(|(block_root, state_map_lock)| (*block_root, state_map_lock.clone_arc()))
            .collect();

        Ok(locks)
    }

    fn get_or_init_by_root(&self, block_root: H256) -> Result<StateMapLock> {
        let state_map_lock = self
            .try_lock_cache()?
            .entry(block_root)
            .or_insert_with(StateMapLock::default)
            .clone_arc();

        Ok(state_map_lock)
    }

    fn get_by_root(&self, block_root: H256) -> Result<Option<StateMapLock>> {
        Ok(self.try_lock_cache()?.get(&block_root).cloned())
    }

    fn try_lock_cache(&self) -> Result<MutexGuard<'_, HashMap<H256, StateMapLock>>> {
        let timeout = self.try_lock_timeout;

        self.cache.try_lock_for(timeout).ok_or_else(|| {
            let error = CacheLockError::CacheLockTimeout { timeout };

            warn!("{error}");

            anyhow!(error)
        })
    }

    fn try_lock_map<'map>(
        &self,
        state_map_lock: &'map StateMapLock,
        block_root: H256,
    ) -> Result<MutexGuard<'map, StateMap>> {
        let timeout = self.try_lock_timeout;

        state_map_lock.try_lock_for(timeout).ok_or_else(|| {
            let error = CacheLockError::StateMapLockTimeout {
                block_root,
                timeout,
            };

            warn!("{error}");

            anyhow!(error)
        })
    }
}
