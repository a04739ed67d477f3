use anyhow::{bail, ensure, Result};
use helper_functions::fork;
use static_assertions::const_assert_eq;
use types::{
    combined::{BeaconBlock, BeaconState, SignedBeaconBlock},
    config::Config,
    nonstandard::Phase,
    phase0::primitives::Slot,
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{
    capella, phase0,
    unphased::{self, Error, ProcessSlots, StateRootPolicy},
};

const_assert_eq!(Phase::VARIANT_COUNT, 2);

pub fn untrusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    signed_block: &SignedBeaconBlock,
) -> Result<()> {
    custom_state_transition::<P>(
        config,
        state,
        signed_block,
        ProcessSlots::Always,
        StateRootPolicy::Verify,
    )
}

pub fn trusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    signed_block: &SignedBeaconBlock,
) -> Result<()> {
    custom_state_transition::<P>(
        config,
        state,
        signed_block,
        ProcessSlots::Always,
        StateRootPolicy::Trust,
    )
}

pub fn custom_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    block: &SignedBeaconBlock,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
) -> Result<()> {
    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(&*state, block.message()) {
        self::process_slots::<P>(config, state, block.slot())?;
    }

    let process_slots = ProcessSlots::Never;

    match (state, block) {
        (BeaconState::Phase0(state), SignedBeaconBlock::Phase0(block)) => {
            phase0::state_transition::<P>(config, state, block, process_slots, state_root_policy)
        }
        (BeaconState::Capella(state), SignedBeaconBlock::Capella(block)) => {
            capella::state_transition::<P>(config, state, block, process_slots, state_root_policy)
        }
        (state, block) => bail!(Error::PhaseMismatch {
            state_phase: state.phase(),
            block_phase: block.phase(),
        }),
    }
}

/// Applies `block` to a state that has already been advanced to its slot.
///
/// The state root in `block` is not checked. Used to compute the state root of new blocks.
pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    block: &BeaconBlock,
) -> Result<()> {
    match (state, block) {
        (BeaconState::Phase0(state), BeaconBlock::Phase0(block)) => {
            phase0::process_block::<P>(config, state, block)
        }
        (BeaconState::Capella(state), BeaconBlock::Capella(block)) => {
            capella::process_block::<P>(config, state, block)
        }
        (state, block) => bail!(Error::PhaseMismatch {
            state_phase: state.phase(),
            block_phase: block.phase(),
        }),
    }
}

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    slot: Slot,
) -> Result<()> {
    ensure!(
        state.slot() < slot,
        Error::SlotNotLater {
            current: state.slot(),
            target: slot,
        },
    );

    let final_phase = config.phase_at_slot::<P>(slot);

    while state.slot() < slot || state.phase() < final_phase {
        match state {
            BeaconState::Phase0(phase0_state) => {
                let last_slot_in_phase = config
                    .fork_slot::<P>(Phase::Capella)
                    .map_or(slot, |fork_slot| fork_slot.min(slot));

                if phase0_state.slot < last_slot_in_phase {
                    unphased::process_slots::<P>(config, phase0_state, last_slot_in_phase)?;
                }

                if config.fork_slot::<P>(Phase::Capella) == Some(last_slot_in_phase) {
                    *state = fork::upgrade_to_capella::<P>(config, phase0_state.clone()).into();
                }
            }
            BeaconState::Capella(capella_state) => {
                unphased::process_slots::<P>(config, capella_state, slot)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std_ext::ArcExt as _;
    use test_case::test_case;
    use types::{
        hashing::HashTreeRoot as _,
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState, containers::BeaconBlockHeader,
            primitives::H256,
        },
        preset::Minimal,
    };

    use super::*;

    fn empty_history_state() -> BeaconState {
        Phase0BeaconState {
            block_roots: vec![H256::zero(); 64].into(),
            state_roots: vec![H256::zero(); 64].into(),
            ..Phase0BeaconState::default()
        }
        .into()
    }

    #[test]
    fn process_slots_upgrades_at_fork_slot() -> Result<()> {
        let config = Config::minimal_with_capella_at(1);
        let mut state = empty_history_state();

        process_slots::<Minimal>(&config, &mut state, 7)?;
        assert_eq!(state.phase(), Phase::Phase0);

        process_slots::<Minimal>(&config, &mut state, 8)?;
        assert_eq!(state.phase(), Phase::Capella);
        assert_eq!(state.slot(), 8);

        process_slots::<Minimal>(&config, &mut state, 10)?;
        assert_eq!(state.phase(), Phase::Capella);
        assert_eq!(state.slot(), 10);

        Ok(())
    }

    #[test]
    fn process_slots_rejects_rewinding() {
        let config = Config::minimal();
        let mut state = empty_history_state();

        assert!(process_slots::<Minimal>(&config, &mut state, 0).is_err());
    }

    #[test]
    fn process_slots_records_block_root_of_previous_slot() -> Result<()> {
        let config = Config::minimal_with_capella_at(u64::MAX);
        let mut state = empty_history_state();

        process_slots::<Minimal>(&config, &mut state, 1)?;

        let BeaconState::Phase0(phase0_state) = &state else {
            panic!("Capella is never scheduled");
        };

        let header = BeaconBlockHeader {
            state_root: phase0_state.state_roots[0],
            ..BeaconBlockHeader::default()
        };

        assert_eq!(phase0_state.block_roots[0], header.hash_tree_root());
        assert_eq!(
            phase0_state.latest_block_header.state_root,
            phase0_state.state_roots[0],
        );

        Ok(())
    }

    #[test_case(StateRootPolicy::Verify, false)]
    #[test_case(StateRootPolicy::Trust, true)]
    fn wrong_state_root_is_only_accepted_when_trusted(
        state_root_policy: StateRootPolicy,
        accepted: bool,
    ) -> Result<()> {
        let config = Config::minimal();
        let genesis_state = factory::min_genesis_state::<Minimal>(&config)?;
        let (block, _) =
            factory::empty_block::<Minimal>(&config, genesis_state.clone_arc(), 1, H256::zero())?;

        let (mut message, signature) = block.as_ref().clone().split();
        message.set_state_root(H256::repeat_byte(0xff));
        let block = message.with_signature(signature);

        let mut state = genesis_state.as_ref().clone();

        let result = custom_state_transition::<Minimal>(
            &config,
            &mut state,
            &block,
            ProcessSlots::Always,
            state_root_policy,
        );

        assert_eq!(result.is_ok(), accepted);

        if let Err(error) = result {
            assert!(matches!(
                error.downcast_ref::<Error>(),
                Some(Error::StateRootMismatch { .. }),
            ));
        }

        Ok(())
    }

    #[test]
    fn blocks_cross_fork_boundary() -> Result<()> {
        let config = Config::minimal_with_capella_at(1);
        let genesis_state = factory::min_genesis_state::<Minimal>(&config)?;

        assert_eq!(genesis_state.phase(), Phase::Phase0);

        let (blocks, state) =
            factory::full_blocks_up_to_epoch::<Minimal>(&config, genesis_state.clone_arc(), 2)?;

        assert_eq!(state.phase(), Phase::Capella);
        assert_eq!(blocks[6].phase(), Phase::Phase0);
        assert_eq!(blocks[7].phase(), Phase::Capella);

        let mut replayed = genesis_state.as_ref().clone();

        for block in &blocks {
            untrusted_state_transition::<Minimal>(&config, &mut replayed, block)?;
        }

        assert_eq!(replayed, *state);

        Ok(())
    }

    #[test]
    fn block_from_other_phase_is_rejected() -> Result<()> {
        let config = Config::minimal_with_capella_at(1);
        let genesis_state = factory::min_genesis_state::<Minimal>(&config)?;
        let (block, _) =
            factory::empty_block::<Minimal>(&config, genesis_state.clone_arc(), 1, H256::zero())?;

        let mut capella_state = genesis_state.as_ref().clone();
        process_slots::<Minimal>(&config, &mut capella_state, 8)?;

        let (message, _) = block.as_ref().clone().split();
        let result = process_block::<Minimal>(&config, &mut capella_state, &message);

        assert!(matches!(
            result.map_err(|error| error.downcast::<Error>()),
            Err(Ok(Error::PhaseMismatch { .. })),
        ));

        Ok(())
    }
}
