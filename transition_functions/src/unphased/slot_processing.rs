use anyhow::{ensure, Result};
use helper_functions::misc;
use typenum::Unsigned as _;
use types::{
    config::Config,
    hashing::HashTreeRoot as _,
    phase0::primitives::Slot,
    preset::Preset,
    traits::{BeaconBlock, BeaconState},
};

use crate::unphased::{self, Error};

#[derive(Clone, Copy)]
pub enum ProcessSlots {
    Always,
    IfNeeded,
    Never,
}

impl ProcessSlots {
    pub fn should_process(
        self,
        state: &impl BeaconState,
        block: &(impl BeaconBlock + ?Sized),
    ) -> bool {
        match self {
            Self::Always => true,
            // The test for equality is intentional. It ensures that blocks attempting to "rewind"
            // the state are rejected early by `process_slots`.
            Self::IfNeeded => state.slot() != block.slot(),
            Self::Never => false,
        }
    }
}

pub fn process_slot<P: Preset>(state: &mut impl BeaconState) -> Result<()> {
    let expected = P::SlotsPerHistoricalRoot::USIZE;

    ensure!(
        state.state_roots().len() == expected && state.block_roots().len() == expected,
        Error::HistoryLengthMismatch {
            expected,
            block_roots: state.block_roots().len(),
            state_roots: state.state_roots().len(),
        },
    );

    let index = usize::try_from(state.slot() % P::SlotsPerHistoricalRoot::U64)?;

    // > Cache state root
    let previous_state_root = state.hash_tree_root();
    state.state_roots_mut().set(index, previous_state_root);

    // > Cache latest block header state root
    if state.latest_block_header().state_root.is_zero() {
        state.latest_block_header_mut().state_root = previous_state_root;
    }

    // > Cache block root
    let previous_block_root = state.latest_block_header().hash_tree_root();
    state.block_roots_mut().set(index, previous_block_root);

    Ok(())
}

/// Advances `state` to `slot`, processing epochs on the way.
///
/// Phase upgrades are handled by [`crate::combined::process_slots`].
pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState,
    slot: Slot,
) -> Result<()> {
    ensure!(
        state.slot() < slot,
        Error::SlotNotLater {
            current: state.slot(),
            target: slot,
        },
    );

    while state.slot() < slot {
        process_slot::<P>(state)?;

        // > Process epoch on the start slot of the next epoch
        if misc::is_epoch_start::<P>(state.slot() + 1) {
            unphased::process_epoch::<P>(config, state)?;
        }

        *state.slot_mut() += 1;
    }

    Ok(())
}
