use anyhow::{ensure, Result};
use itertools::Itertools as _;
use types::{
    phase0::{
        containers::{AttestationData, IndexedAttestation, Validator},
        primitives::Epoch,
    },
    traits::BeaconState,
};

use crate::error::Error;

// > Check if ``validator`` is active.
#[inline]
#[must_use]
pub const fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

// > Check if ``validator`` is slashable.
#[inline]
#[must_use]
pub const fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && epoch < validator.withdrawable_epoch
        && validator.activation_epoch <= epoch
}

// > Check if ``data_1`` and ``data_2`` are slashable according to Casper FFG rules.
#[inline]
#[must_use]
pub fn is_slashable_attestation_data(data_1: AttestationData, data_2: AttestationData) -> bool {
    (data_1 != data_2 && data_1.target.epoch == data_2.target.epoch)
        || (data_1.source.epoch < data_2.source.epoch && data_2.target.epoch < data_1.target.epoch)
}

/// Structural checks on an indexed attestation.
///
/// Signatures are verified before attestations reach the state transition.
pub fn validate_indexed_attestation(
    state: &impl BeaconState,
    indexed_attestation: &IndexedAttestation,
) -> Result<()> {
    let indices = &indexed_attestation.attesting_indices;

    ensure!(!indices.is_empty(), Error::AttestationHasNoAttestingIndices);

    // > Verify indices are sorted and unique
    ensure!(
        indices.iter().tuple_windows().all(|(a, b)| a < b),
        Error::AttestingIndicesNotSortedAndUnique,
    );

    let validator_count = state.validators().len() as u64;

    for validator_index in indices.iter().copied() {
        ensure!(
            validator_index < validator_count,
            Error::ValidatorIndexOutOfBounds { validator_index },
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::phase0::{
        beacon_state::BeaconState as Phase0BeaconState, consts::FAR_FUTURE_EPOCH,
        containers::Checkpoint,
    };

    use super::*;

    fn data(source_epoch: Epoch, target_epoch: Epoch, slot: u64) -> AttestationData {
        AttestationData {
            slot,
            source: Checkpoint {
                epoch: source_epoch,
                ..Checkpoint::default()
            },
            target: Checkpoint {
                epoch: target_epoch,
                ..Checkpoint::default()
            },
            ..AttestationData::default()
        }
    }

    #[test_case(data(0, 1, 8), data(0, 1, 9), true; "double vote")]
    #[test_case(data(0, 3, 24), data(1, 2, 16), true; "surround vote")]
    #[test_case(data(0, 1, 8), data(0, 1, 8), false; "identical votes")]
    #[test_case(data(0, 1, 8), data(1, 2, 16), false; "consecutive votes")]
    fn slashable_attestation_data(
        data_1: AttestationData,
        data_2: AttestationData,
        expected: bool,
    ) {
        assert_eq!(is_slashable_attestation_data(data_1, data_2), expected);
    }

    #[test]
    fn validator_activity_window() {
        let validator = Validator {
            activation_epoch: 2,
            exit_epoch: 5,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        assert!(!is_active_validator(&validator, 1));
        assert!(is_active_validator(&validator, 2));
        assert!(!is_active_validator(&validator, 5));
        assert!(is_slashable_validator(&validator, 7));
    }

    #[test_case(vec![], false)]
    #[test_case(vec![0, 1], true)]
    #[test_case(vec![1, 1], false)]
    #[test_case(vec![2, 1], false)]
    #[test_case(vec![0, 3], false)]
    fn indexed_attestation_structure(attesting_indices: Vec<u64>, valid: bool) {
        let state = Phase0BeaconState {
            validators: vec![Validator::default(); 3].into(),
            ..Phase0BeaconState::default()
        };

        let indexed_attestation = IndexedAttestation {
            attesting_indices,
            ..IndexedAttestation::default()
        };

        assert_eq!(
            validate_indexed_attestation(&state, &indexed_attestation).is_ok(),
            valid,
        );
    }
}
