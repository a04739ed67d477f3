use anyhow::Result;
use types::{
    config::Config,
    phase0::{beacon_state::BeaconState, containers::SignedBeaconBlock},
    preset::Preset,
};

use crate::{
    phase0,
    unphased::{self, ProcessSlots, StateRootPolicy},
};

pub fn state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    signed_block: &SignedBeaconBlock,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
) -> Result<()> {
    let block = &signed_block.message;

    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(state, block) {
        unphased::process_slots::<P>(config, state, block.slot)?;
    }

    // > Process block
    phase0::process_block::<P>(config, state, block)?;

    // > Verify state root
    state_root_policy.verify(state, block)
}
