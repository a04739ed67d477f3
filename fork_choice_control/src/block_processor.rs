use core::marker::PhantomData;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use fork_choice_store::Store;
use prometheus_metrics::Metrics;
use std_ext::ArcExt as _;
use transition_functions::{
    combined,
    unphased::{ProcessSlots, StateRootPolicy},
};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config as ChainConfig,
    phase0::primitives::H256,
    preset::Preset,
};

use crate::error::ReceiveBlockError;

/// Runs the state transition for blocks received by [`Controller`].
///
/// [`Controller`]: crate::Controller
pub struct BlockProcessor<P: Preset> {
    chain_config: Arc<ChainConfig>,
    metrics: Option<Arc<Metrics>>,
    phantom: PhantomData<P>,
}

impl<P: Preset> BlockProcessor<P> {
    #[must_use]
    pub const fn new(chain_config: Arc<ChainConfig>, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            chain_config,
            metrics,
            phantom: PhantomData,
        }
    }

    /// Checks `block` against `store` and computes its post-state.
    ///
    /// `store` is only read, so this can run on a snapshot while other blocks are committed.
    /// Failures of the state transition are wrapped in [`ReceiveBlockError::InvalidBlock`].
    pub fn validate_block(
        &self,
        store: &Store<P>,
        pre_state: Arc<BeaconState>,
        block: &SignedBeaconBlock,
        block_root: H256,
    ) -> Result<Arc<BeaconState>> {
        store.validate_block(block)?;
        self.transition_block(pre_state, block, block_root)
    }

    /// Computes the post-state of `block` without consulting fork choice.
    ///
    /// Used for blocks in a batch whose parents have not been committed yet.
    pub fn transition_block(
        &self,
        pre_state: Arc<BeaconState>,
        block: &SignedBeaconBlock,
        block_root: H256,
    ) -> Result<Arc<BeaconState>> {
        self.perform_state_transition(pre_state, block, StateRootPolicy::Verify)
            .with_context(|| ReceiveBlockError::InvalidBlock { block_root })
    }

    /// Applies a block that has already been accepted once, without checking its state root.
    pub fn replay_block(
        &self,
        pre_state: Arc<BeaconState>,
        block: &SignedBeaconBlock,
    ) -> Result<Arc<BeaconState>> {
        self.perform_state_transition(pre_state, block, StateRootPolicy::Trust)
    }

    fn perform_state_transition(
        &self,
        mut state: Arc<BeaconState>,
        block: &SignedBeaconBlock,
        state_root_policy: StateRootPolicy,
    ) -> Result<Arc<BeaconState>> {
        let timer = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.block_transition_times.start_timer());

        combined::custom_state_transition::<P>(
            &self.chain_config,
            state.make_mut(),
            block,
            ProcessSlots::IfNeeded,
            state_root_policy,
        )?;

        prometheus_metrics::stop_and_record(timer);

        Ok(state)
    }
}
