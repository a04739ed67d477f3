use anyhow::Result;
use types::{
    config::Config,
    phase0::{beacon_state::BeaconState, containers::BeaconBlock},
    preset::Preset,
};

use crate::unphased;

pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    block: &BeaconBlock,
) -> Result<()> {
    unphased::process_block_header::<P>(state, block)?;
    unphased::process_operations::<P>(config, state, &block.body)
}
