use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use helper_functions::misc;
use log::{debug, info};
use state_cache::StateCache;
use std_ext::ArcExt as _;
use thiserror::Error;
use transition_functions::combined;
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config as ChainConfig,
    phase0::{
        containers::Checkpoint,
        primitives::{Slot, H256},
    },
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{block_processor::BlockProcessor, storage::Storage};

/// Produces the state for any known block root.
///
/// States are looked up in the in-memory [`StateCache`] first, then in storage. If neither has
/// the state, blocks are loaded from storage back to the nearest stored state and replayed.
///
/// Only the states of epoch boundary blocks are written to storage by default. While finality is
/// delayed every state is written, which bounds the number of blocks a replay has to apply.
pub struct StateGenerator<P: Preset, S> {
    chain_config: Arc<ChainConfig>,
    state_cache: StateCache,
    storage: Arc<S>,
    block_processor: Arc<BlockProcessor<P>>,
    save_hot_states: AtomicBool,
}

impl<P: Preset, S: Storage> StateGenerator<P, S> {
    #[must_use]
    pub const fn new(
        chain_config: Arc<ChainConfig>,
        state_cache: StateCache,
        storage: Arc<S>,
        block_processor: Arc<BlockProcessor<P>>,
    ) -> Self {
        Self {
            chain_config,
            state_cache,
            storage,
            block_processor,
            save_hot_states: AtomicBool::new(false),
        }
    }

    /// Post-state of the block with root `block_root`.
    pub fn state_by_root(&self, block_root: H256) -> Result<Arc<BeaconState>> {
        if let Some(state) = self.state_cache.earliest(block_root)? {
            return Ok(state);
        }

        if let Some(state) = self.storage.state_by_block_root(block_root)? {
            self.state_cache.insert(block_root, state.clone_arc())?;
            return Ok(state);
        }

        self.replay_to(block_root)
    }

    /// Latest known state for `block_root` with a slot not greater than `slot`.
    ///
    /// This is suitable as the pre-state of a child block at `slot`.
    pub fn state_before_or_at_slot(
        &self,
        block_root: H256,
        slot: Slot,
    ) -> Result<Arc<BeaconState>> {
        if let Some(state) = self.state_cache.before_or_at_slot(block_root, slot)? {
            return Ok(state);
        }

        self.state_by_root(block_root)
    }

    /// State of `checkpoint.root` advanced to the first slot of `checkpoint.epoch`.
    pub fn checkpoint_state(&self, checkpoint: Checkpoint) -> Result<Arc<BeaconState>> {
        let Checkpoint { epoch, root } = checkpoint;
        let slot = misc::compute_start_slot_at_epoch::<P>(epoch);

        // The post-state must be loaded before the cache entry for `root` is locked.
        let post_state = self.state_by_root(root)?;

        if post_state.slot() >= slot {
            return Ok(post_state);
        }

        self.state_cache.get_or_insert_with(root, slot, |pre_state| {
            let mut state = pre_state.unwrap_or(&post_state).clone_arc();

            features::log!(
                WarnOnStateCacheSlotProcessing,
                "processing slots for checkpoint state \
                 (block_root: {root:?}, from slot: {}, to slot: {slot})",
                state.slot(),
            );

            combined::process_slots::<P>(&self.chain_config, state.make_mut(), slot)?;

            Ok(state)
        })
    }

    /// Caches `state` and writes it to storage if it is an epoch boundary state or hot states are
    /// being saved.
    pub fn save_state(&self, block_root: H256, state: &Arc<BeaconState>) -> Result<()> {
        self.state_cache.insert(block_root, state.clone_arc())?;

        if self.is_saving_hot_states() || misc::is_epoch_start::<P>(state.slot()) {
            self.storage.save_state(block_root, state)?;
        }

        Ok(())
    }

    pub fn enable_save_hot_state_to_db(&self) {
        if !self.save_hot_states.swap(true, Ordering::SeqCst) {
            info!("finality is delayed; saving all hot states to storage");
        }
    }

    pub fn disable_save_hot_state_to_db(&self) {
        if self.save_hot_states.swap(false, Ordering::SeqCst) {
            info!("finality resumed; saving only epoch boundary states to storage");
        }
    }

    #[must_use]
    pub fn is_saving_hot_states(&self) -> bool {
        self.save_hot_states.load(Ordering::SeqCst)
    }

    pub fn prune(&self, finalized_slot: Slot) -> Result<()> {
        self.state_cache.prune(finalized_slot)
    }

    pub fn cached_state_count(&self) -> Result<usize> {
        self.state_cache.len()
    }

    fn replay_to(&self, block_root: H256) -> Result<Arc<BeaconState>> {
        let mut blocks = vec![];
        let mut current_root = block_root;

        let mut state = loop {
            let block = self.block_by_root(current_root)?;
            let parent_root = block.parent_root();

            blocks.push(block);

            if let Some(state) = self.state_cache.earliest(parent_root)? {
                break state;
            }

            if let Some(state) = self.storage.state_by_block_root(parent_root)? {
                break state;
            }

            current_root = parent_root;
        };

        debug!(
            "replaying {} blocks to regenerate state for block {block_root:?}",
            blocks.len(),
        );

        for block in blocks.iter().rev() {
            state = self.block_processor.replay_block(state, block)?;
        }

        self.state_cache.insert(block_root, state.clone_arc())?;

        Ok(state)
    }

    fn block_by_root(&self, block_root: H256) -> Result<Arc<SignedBeaconBlock>> {
        self.storage
            .block_by_root(block_root)?
            .ok_or_else(|| Error::BlockNotFound { block_root }.into())
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("block required for state regeneration is not in storage: {block_root:?}")]
    BlockNotFound { block_root: H256 },
}
