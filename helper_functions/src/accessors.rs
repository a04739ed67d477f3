use anyhow::{ensure, Result};
use bitvec::slice::BitSlice;
use itertools::Itertools as _;
use tap::Pipe as _;
use typenum::Unsigned as _;
use types::{
    hashing::HashTreeRoot as _,
    phase0::{
        consts::GENESIS_EPOCH,
        containers::{Attestation, AttestationData, IndexedAttestation},
        primitives::{CommitteeIndex, Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{error::Error, misc, predicates};

#[must_use]
pub fn get_current_epoch<P: Preset>(state: &impl BeaconState) -> Epoch {
    misc::compute_epoch_at_slot::<P>(state.slot())
}

#[must_use]
pub fn get_previous_epoch<P: Preset>(state: &impl BeaconState) -> Epoch {
    get_current_epoch::<P>(state)
        .saturating_sub(1)
        .max(GENESIS_EPOCH)
}

#[must_use]
pub fn get_next_epoch<P: Preset>(state: &impl BeaconState) -> Epoch {
    get_current_epoch::<P>(state) + 1
}

#[must_use]
pub fn get_finality_delay<P: Preset>(state: &impl BeaconState) -> u64 {
    get_previous_epoch::<P>(state).saturating_sub(state.finalized_checkpoint().epoch)
}

pub fn get_block_root<P: Preset>(state: &impl BeaconState, epoch: Epoch) -> Result<H256> {
    get_block_root_at_slot::<P>(state, misc::compute_start_slot_at_epoch::<P>(epoch))
}

pub fn get_block_root_at_slot<P: Preset>(state: &impl BeaconState, slot: Slot) -> Result<H256> {
    ensure!(slot < state.slot(), Error::SlotOutOfRange);

    ensure!(
        state.slot() <= slot + P::SlotsPerHistoricalRoot::U64,
        Error::SlotOutOfRange,
    );

    let index = usize::try_from(slot % P::SlotsPerHistoricalRoot::U64)?;

    state
        .block_roots()
        .get(index)
        .copied()
        .ok_or(Error::SlotOutOfRange)?
        .pipe(Ok)
}

/// Root of the block most recently applied to `state`.
///
/// `state.latest_block_header().state_root` is zero until the next slot is processed,
/// so the root of `state` itself is filled in when needed.
#[must_use]
pub fn latest_block_root(state: &impl BeaconState) -> H256 {
    let mut header = state.latest_block_header();

    if header.state_root.is_zero() {
        header.state_root = state.hash_tree_root();
    }

    header.hash_tree_root()
}

pub fn get_active_validator_indices(
    state: &impl BeaconState,
    epoch: Epoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    state
        .validators()
        .iter()
        .zip(0..)
        .filter(move |(validator, _)| predicates::is_active_validator(validator, epoch))
        .map(|(_, index)| index)
}

#[must_use]
pub fn active_validator_count(state: &impl BeaconState, epoch: Epoch) -> u64 {
    get_active_validator_indices(state, epoch).count() as u64
}

#[must_use]
pub fn get_committee_count_per_slot<P: Preset>(state: &impl BeaconState, epoch: Epoch) -> u64 {
    misc::committee_count_from_active_validator_count::<P>(active_validator_count(state, epoch))
}

/// Validators assigned to committee `committee_index` at `slot`.
///
/// Committees are contiguous slices of the active validator set in registry order.
pub fn beacon_committee<P: Preset>(
    state: &impl BeaconState,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<Vec<ValidatorIndex>> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);

    ensure!(
        get_previous_epoch::<P>(state) <= epoch && epoch <= get_next_epoch::<P>(state),
        Error::EpochOutOfRange { epoch },
    );

    let committees_per_slot = get_committee_count_per_slot::<P>(state, epoch);

    ensure!(
        committee_index < committees_per_slot,
        Error::CommitteeIndexOutOfBounds {
            index: committee_index,
        },
    );

    let indices = get_active_validator_indices(state, epoch).collect_vec();
    let validator_count = indices.len() as u64;
    let committees_in_epoch = committees_per_slot * P::SlotsPerEpoch::U64;
    let index_in_epoch =
        misc::slots_since_epoch_start::<P>(slot) * committees_per_slot + committee_index;
    let start = usize::try_from(validator_count * index_in_epoch / committees_in_epoch)?;
    let end = usize::try_from(validator_count * (index_in_epoch + 1) / committees_in_epoch)?;

    Ok(indices[start..end].to_vec())
}

pub fn get_beacon_proposer_index<P: Preset>(state: &impl BeaconState) -> Result<ValidatorIndex> {
    get_beacon_proposer_index_at_slot::<P>(state, state.slot())
}

pub fn get_beacon_proposer_index_at_slot<P: Preset>(
    state: &impl BeaconState,
    slot: Slot,
) -> Result<ValidatorIndex> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let indices = get_active_validator_indices(state, epoch).collect_vec();

    ensure!(!indices.is_empty(), Error::NoActiveValidators);

    let position = usize::try_from(slot % indices.len() as u64)?;

    Ok(indices[position])
}

pub fn get_attesting_indices<P: Preset>(
    state: &impl BeaconState,
    attestation_data: AttestationData,
    aggregation_bits: &BitSlice<u8>,
) -> Result<Vec<ValidatorIndex>> {
    let committee = beacon_committee::<P>(state, attestation_data.slot, attestation_data.index)?;

    ensure!(
        committee.len() == aggregation_bits.len(),
        Error::CommitteeLengthMismatch {
            aggregation_bitlist_length: aggregation_bits.len(),
            committee_length: committee.len(),
        },
    );

    aggregation_bits
        .iter()
        .by_vals()
        .zip(committee)
        .filter_map(|(present, validator_index)| present.then_some(validator_index))
        .collect_vec()
        .pipe(Ok)
}

pub fn get_indexed_attestation<P: Preset>(
    state: &impl BeaconState,
    attestation: &Attestation,
) -> Result<IndexedAttestation> {
    let mut attesting_indices =
        get_attesting_indices::<P>(state, attestation.data, &attestation.aggregation_bits)?;

    attesting_indices.sort_unstable();

    Ok(IndexedAttestation {
        attesting_indices,
        data: attestation.data,
        signatures: attestation.signatures.clone(),
    })
}

/// Sum of effective balances of `indices`, with a floor of one balance increment.
pub fn get_total_balance<P: Preset>(
    state: &impl BeaconState,
    indices: impl IntoIterator<Item = ValidatorIndex>,
) -> Result<Gwei> {
    let mut total = 0;

    for validator_index in indices {
        let validator = usize::try_from(validator_index)?
            .pipe(|index| state.validators().get(index))
            .ok_or(Error::ValidatorIndexOutOfBounds { validator_index })?;

        total += validator.effective_balance;
    }

    Ok(total.max(P::EFFECTIVE_BALANCE_INCREMENT.get()))
}

pub fn get_total_active_balance<P: Preset>(state: &impl BeaconState) -> Result<Gwei> {
    let epoch = get_current_epoch::<P>(state);
    get_total_balance::<P>(state, get_active_validator_indices(state, epoch).collect_vec())
}

#[cfg(test)]
mod tests {
    use bitvec::{bitvec, order::Lsb0};
    use im::Vector;
    use types::{
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState,
            consts::FAR_FUTURE_EPOCH,
            containers::{Checkpoint, Validator},
        },
        preset::Minimal,
    };

    use super::*;

    fn state_with_validators(count: usize, slot: Slot) -> Phase0BeaconState {
        let validator = Validator {
            effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        Phase0BeaconState {
            slot,
            validators: core::iter::repeat_n(validator, count).collect(),
            balances: core::iter::repeat_n(Minimal::MAX_EFFECTIVE_BALANCE, count).collect(),
            block_roots: Vector::from(vec![H256::zero(); 64]),
            ..Phase0BeaconState::default()
        }
    }

    #[test]
    fn committees_partition_active_validators() -> Result<()> {
        let state = state_with_validators(64, 0);
        let mut seen = vec![];

        for slot in 0..8 {
            for index in 0..get_committee_count_per_slot::<Minimal>(&state, 0) {
                seen.extend(beacon_committee::<Minimal>(&state, slot, index)?);
            }
        }

        assert_eq!(seen, (0..64).collect_vec());

        Ok(())
    }

    #[test]
    fn committee_index_out_of_bounds_is_rejected() {
        let state = state_with_validators(64, 0);

        assert!(beacon_committee::<Minimal>(&state, 0, 2).is_err());
    }

    #[test]
    fn proposer_rotates_through_active_validators() -> Result<()> {
        let state = state_with_validators(4, 6);

        assert_eq!(get_beacon_proposer_index::<Minimal>(&state)?, 2);
        assert_eq!(get_beacon_proposer_index_at_slot::<Minimal>(&state, 5)?, 1);

        Ok(())
    }

    #[test]
    fn attesting_indices_follow_aggregation_bits() -> Result<()> {
        let state = state_with_validators(64, 0);
        let data = AttestationData {
            slot: 1,
            index: 1,
            ..AttestationData::default()
        };

        let aggregation_bits = bitvec![u8, Lsb0; 1, 0, 0, 1];
        let indices = get_attesting_indices::<Minimal>(&state, data, &aggregation_bits)?;

        assert_eq!(indices, [12, 15]);

        Ok(())
    }

    #[test]
    fn aggregation_bits_must_match_committee_length() {
        let state = state_with_validators(64, 0);
        let data = AttestationData::default();

        let result = get_attesting_indices::<Minimal>(&state, data, &bitvec![u8, Lsb0; 1, 0]);

        assert!(result.is_err());
    }

    #[test]
    fn block_root_lookup_is_bounded_by_history() {
        let state = state_with_validators(1, 100);

        assert!(get_block_root_at_slot::<Minimal>(&state, 99).is_ok());
        assert!(get_block_root_at_slot::<Minimal>(&state, 100).is_err());
        assert!(get_block_root_at_slot::<Minimal>(&state, 35).is_err());
    }

    #[test]
    fn finality_delay_counts_from_previous_epoch() {
        let mut state = state_with_validators(1, 40);

        state.finalized_checkpoint = Checkpoint {
            epoch: 2,
            root: H256::zero(),
        };

        assert_eq!(get_finality_delay::<Minimal>(&state), 2);
    }

    #[test]
    fn total_balance_has_a_floor() -> Result<()> {
        let state = state_with_validators(2, 0);

        assert_eq!(
            get_total_balance::<Minimal>(&state, [])?,
            Minimal::EFFECTIVE_BALANCE_INCREMENT.get(),
        );
        assert_eq!(
            get_total_active_balance::<Minimal>(&state)?,
            2 * Minimal::MAX_EFFECTIVE_BALANCE,
        );

        Ok(())
    }
}
