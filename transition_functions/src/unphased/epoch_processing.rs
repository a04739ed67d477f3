use anyhow::Result;
use helper_functions::{
    accessors::{
        get_attesting_indices, get_block_root, get_current_epoch, get_previous_epoch,
        get_total_active_balance, get_total_balance,
    },
    mutators::initiate_validator_exit,
    predicates::is_active_validator,
};
use itertools::Itertools as _;
use types::{
    config::Config,
    phase0::{
        consts::GENESIS_EPOCH,
        containers::{Checkpoint, PendingAttestation},
        primitives::{Epoch, Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::BeaconState,
};

const HYSTERESIS_QUOTIENT: u64 = 4;
const HYSTERESIS_DOWNWARD_MULTIPLIER: u64 = 1;
const HYSTERESIS_UPWARD_MULTIPLIER: u64 = 5;

pub fn process_epoch<P: Preset>(config: &Config, state: &mut impl BeaconState) -> Result<()> {
    process_justification_and_finalization::<P>(state)?;
    process_registry_updates::<P>(config, state)?;
    process_effective_balance_updates::<P>(state);
    process_participation_record_updates(state);
    Ok(())
}

pub fn process_justification_and_finalization<P: Preset>(
    state: &mut impl BeaconState,
) -> Result<()> {
    if !should_process_justification_and_finalization::<P>(state) {
        return Ok(());
    }

    let previous_epoch = get_previous_epoch::<P>(state);
    let current_epoch = get_current_epoch::<P>(state);

    let total_active_balance = get_total_active_balance::<P>(state)?;

    let previous_target_indices = matching_target_attesting_indices::<P>(
        state,
        state.previous_epoch_attestations(),
        previous_epoch,
    )?;

    let current_target_indices = matching_target_attesting_indices::<P>(
        state,
        state.current_epoch_attestations(),
        current_epoch,
    )?;

    let previous_epoch_target_balance = get_total_balance::<P>(state, previous_target_indices)?;
    let current_epoch_target_balance = get_total_balance::<P>(state, current_target_indices)?;

    weigh_justification_and_finalization::<P>(
        state,
        total_active_balance,
        previous_epoch_target_balance,
        current_epoch_target_balance,
    )
}

pub fn should_process_justification_and_finalization<P: Preset>(state: &impl BeaconState) -> bool {
    // > Initial FFG checkpoint values have a `0x00` stub for `root`.
    // > Skip FFG updates in the first two epochs to avoid
    // > corner cases that might result in modifying this stub.
    GENESIS_EPOCH + 1 < get_current_epoch::<P>(state)
}

// Unslashed validators whose attestations voted for the epoch boundary block of `epoch`.
fn matching_target_attesting_indices<P: Preset>(
    state: &impl BeaconState,
    attestations: &im::Vector<PendingAttestation>,
    epoch: Epoch,
) -> Result<Vec<ValidatorIndex>> {
    let target_root = get_block_root::<P>(state, epoch)?;
    let mut indices = vec![];

    for attestation in attestations {
        let data = attestation.data;

        if data.target.epoch != epoch || data.target.root != target_root {
            continue;
        }

        indices.extend(get_attesting_indices::<P>(
            state,
            data,
            &attestation.aggregation_bits,
        )?);
    }

    let validators = state.validators();

    let unslashed = indices
        .into_iter()
        .unique()
        .filter(|index| {
            usize::try_from(*index)
                .ok()
                .and_then(|index| validators.get(index))
                .is_some_and(|validator| !validator.slashed)
        })
        .collect();

    Ok(unslashed)
}

pub fn weigh_justification_and_finalization<P: Preset>(
    state: &mut impl BeaconState,
    current_epoch_active_balance: Gwei,
    previous_epoch_target_balance: Gwei,
    current_epoch_target_balance: Gwei,
) -> Result<()> {
    let old_previous_justified_checkpoint = state.previous_justified_checkpoint();
    let old_current_justified_checkpoint = state.current_justified_checkpoint();
    let previous_epoch = get_previous_epoch::<P>(state);
    let current_epoch = get_current_epoch::<P>(state);

    // > Process justifications
    *state.previous_justified_checkpoint_mut() = state.current_justified_checkpoint();

    let bits = state.justification_bits_mut();
    bits.rotate_right(1);
    bits[0] = false;

    if previous_epoch_target_balance * 3 >= current_epoch_active_balance * 2 {
        *state.current_justified_checkpoint_mut() = Checkpoint {
            epoch: previous_epoch,
            root: get_block_root::<P>(state, previous_epoch)?,
        };

        state.justification_bits_mut()[1] = true;
    }

    if current_epoch_target_balance * 3 >= current_epoch_active_balance * 2 {
        *state.current_justified_checkpoint_mut() = Checkpoint {
            epoch: current_epoch,
            root: get_block_root::<P>(state, current_epoch)?,
        };

        state.justification_bits_mut()[0] = true;
    }

    // > Process finalizations
    let bits = state.justification_bits();

    // > The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source
    if bits[1..4].iter().all(|bit| *bit)
        && old_previous_justified_checkpoint.epoch + 3 == current_epoch
    {
        *state.finalized_checkpoint_mut() = old_previous_justified_checkpoint;
    }

    // > The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source
    if bits[1..3].iter().all(|bit| *bit)
        && old_previous_justified_checkpoint.epoch + 2 == current_epoch
    {
        *state.finalized_checkpoint_mut() = old_previous_justified_checkpoint;
    }

    // > The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source
    if bits[0..3].iter().all(|bit| *bit)
        && old_current_justified_checkpoint.epoch + 2 == current_epoch
    {
        *state.finalized_checkpoint_mut() = old_current_justified_checkpoint;
    }

    // > The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source
    if bits[0..2].iter().all(|bit| *bit)
        && old_current_justified_checkpoint.epoch + 1 == current_epoch
    {
        *state.finalized_checkpoint_mut() = old_current_justified_checkpoint;
    }

    Ok(())
}

pub fn process_registry_updates<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState,
) -> Result<()> {
    let current_epoch = get_current_epoch::<P>(state);

    // > Process ejections
    let ejected = state
        .validators()
        .iter()
        .zip(0..)
        .filter(|(validator, _)| {
            is_active_validator(validator, current_epoch)
                && validator.effective_balance <= config.ejection_balance
        })
        .map(|(_, index)| index)
        .collect_vec();

    for validator_index in ejected {
        initiate_validator_exit::<P>(config, state, validator_index)?;
    }

    Ok(())
}

pub fn process_effective_balance_updates<P: Preset>(state: &mut impl BeaconState) {
    let increment = P::EFFECTIVE_BALANCE_INCREMENT.get();
    let hysteresis_increment = increment / HYSTERESIS_QUOTIENT;
    let downward_threshold = hysteresis_increment * HYSTERESIS_DOWNWARD_MULTIPLIER;
    let upward_threshold = hysteresis_increment * HYSTERESIS_UPWARD_MULTIPLIER;

    let balances = state.balances().clone();

    for (validator, balance) in state.validators_mut().iter_mut().zip(balances) {
        let effective_balance = validator.effective_balance;

        if balance + downward_threshold < effective_balance
            || effective_balance + upward_threshold < balance
        {
            validator.effective_balance =
                (balance - balance % increment).min(P::MAX_EFFECTIVE_BALANCE);
        }
    }
}

pub fn process_participation_record_updates(state: &mut impl BeaconState) {
    // > Rotate current/previous epoch attestations
    *state.previous_epoch_attestations_mut() =
        core::mem::take(state.current_epoch_attestations_mut());
}
