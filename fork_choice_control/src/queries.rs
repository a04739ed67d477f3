use core::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use arc_swap::Guard;
use execution_engine::ExecutionEngine;
use fork_choice_store::Store;
use log::warn;
use operation_pools::{AttestationPool, OperationPools};
use types::{
    combined::BeaconState,
    config::Config as ChainConfig,
    phase0::{
        containers::Checkpoint,
        primitives::{Epoch, Gwei, Slot, H256},
    },
    preset::Preset,
};

use crate::{controller::Controller, events::EventChannels, head::Head, storage::Storage};

// Queries read the published snapshot of the store and never wait for a commit in progress.
// `state_by_root` may replay blocks and should not be called directly from `async` tasks.
impl<P: Preset, E: ExecutionEngine, S: Storage> Controller<P, E, S> {
    #[must_use]
    pub fn head(&self) -> Head {
        self.head.get()
    }

    #[must_use]
    pub fn head_root(&self) -> H256 {
        self.head.block_root()
    }

    #[must_use]
    pub fn head_slot(&self) -> Slot {
        self.head.slot()
    }

    #[must_use]
    pub fn head_state(&self) -> Arc<BeaconState> {
        self.head.state()
    }

    /// Slot of the fork choice clock.
    #[must_use]
    pub fn slot(&self) -> Slot {
        self.store_snapshot().slot()
    }

    #[must_use]
    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.store_snapshot().justified_checkpoint()
    }

    #[must_use]
    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.store_snapshot().finalized_checkpoint()
    }

    #[must_use]
    pub fn finalized_epoch(&self) -> Epoch {
        self.store_snapshot().finalized_epoch()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.store_snapshot().node_count()
    }

    /// Whether the block is in fork choice or in storage.
    ///
    /// Storage errors are logged and treated as the block being absent.
    #[must_use]
    pub fn has_block(&self, block_root: H256) -> bool {
        if self.store_snapshot().contains_block(block_root) {
            return true;
        }

        self.storage.has_block(block_root).unwrap_or_else(|error| {
            warn!("failed to look up block {block_root:?} in storage: {error}");
            false
        })
    }

    #[must_use]
    pub fn is_being_processed(&self, block_root: H256) -> bool {
        self.being_synced.contains(block_root)
    }

    /// `None` if the block is not in fork choice.
    #[must_use]
    pub fn is_optimistic(&self, block_root: H256) -> Option<bool> {
        self.store_snapshot().is_optimistic(block_root)
    }

    #[must_use]
    pub fn block_slot(&self, block_root: H256) -> Option<Slot> {
        self.store_snapshot().block_slot(block_root)
    }

    #[must_use]
    pub fn weight(&self, block_root: H256) -> Option<Gwei> {
        self.store_snapshot().weight(block_root)
    }

    #[must_use]
    pub fn is_descendant(&self, descendant_root: H256, ancestor_root: H256) -> bool {
        self.store_snapshot()
            .is_descendant(descendant_root, ancestor_root)
    }

    /// Roots of the canonical chain from the head back to the finalized block.
    #[must_use]
    pub fn canonical_chain(&self) -> Vec<H256> {
        self.store_snapshot()
            .canonical_chain()
            .map(|node| node.block_root)
            .collect()
    }

    pub fn state_by_root(&self, block_root: H256) -> Result<Arc<BeaconState>> {
        self.state_generator.state_by_root(block_root)
    }

    #[must_use]
    pub fn is_saving_hot_states(&self) -> bool {
        self.state_generator.is_saving_hot_states()
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Number of times the store lock has been acquired since the controller was created.
    #[must_use]
    pub fn lock_acquisitions(&self) -> u64 {
        self.store_lock.lock_acquisitions()
    }

    #[must_use]
    pub const fn chain_config(&self) -> &Arc<ChainConfig> {
        &self.chain_config
    }

    #[must_use]
    pub const fn event_channels(&self) -> &Arc<EventChannels> {
        &self.event_channels
    }

    #[must_use]
    pub const fn attestation_pool(&self) -> &Arc<AttestationPool> {
        &self.attestation_pool
    }

    #[must_use]
    pub const fn operation_pools(&self) -> &Arc<OperationPools> {
        &self.operation_pools
    }

    #[must_use]
    pub fn store_snapshot(&self) -> Guard<Arc<Store<P>>> {
        self.store_lock.snapshot()
    }
}
