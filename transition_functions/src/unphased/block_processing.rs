use anyhow::{ensure, Result};
use helper_functions::{
    accessors::{
        get_beacon_proposer_index, get_current_epoch, get_indexed_attestation, get_previous_epoch,
    },
    misc::{compute_activation_exit_epoch, compute_epoch_at_slot},
    mutators::{balance, increase_balance, initiate_validator_exit, slash_validator},
    predicates::{
        is_active_validator, is_slashable_attestation_data, is_slashable_validator,
        validate_indexed_attestation,
    },
};
use itertools::Itertools as _;
use typenum::Unsigned as _;
use types::{
    config::Config,
    hashing::HashTreeRoot as _,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        containers::{
            Attestation, AttesterSlashing, BeaconBlockHeader, Deposit, PendingAttestation,
            ProposerSlashing, SignedVoluntaryExit, Validator,
        },
        primitives::{ValidatorIndex, H256},
    },
    preset::Preset,
    traits::{BeaconBlock, BeaconBlockBody, BeaconState},
};

use crate::unphased::Error;

pub fn process_block_header<P: Preset>(
    state: &mut impl BeaconState,
    block: &(impl BeaconBlock + ?Sized),
) -> Result<()> {
    // > Verify that the slots match
    ensure!(
        block.slot() == state.slot(),
        Error::SlotMismatch {
            state_slot: state.slot(),
            block_slot: block.slot(),
        },
    );

    // > Verify that the block is newer than latest block header
    ensure!(
        block.slot() > state.latest_block_header().slot,
        Error::BlockNotNewerThanLatestBlockHeader {
            block_slot: block.slot(),
            block_header_slot: state.latest_block_header().slot,
        },
    );

    // > Verify that proposer index is the correct index
    let computed = get_beacon_proposer_index::<P>(state)?;
    let in_block = block.proposer_index();

    ensure!(
        computed == in_block,
        Error::ProposerIndexMismatch { computed, in_block },
    );

    // > Verify that the parent matches
    let computed = state.latest_block_header().hash_tree_root();
    let in_block = block.parent_root();

    ensure!(
        computed == in_block,
        Error::ParentRootMismatch { computed, in_block },
    );

    // > Cache current block as the new latest block
    *state.latest_block_header_mut() = BeaconBlockHeader {
        // > Overwritten in the next process_slot call
        state_root: H256::zero(),
        ..block.to_header()
    };

    // > Verify proposer is not slashed
    let index = block.proposer_index();

    ensure!(
        !validator(state, index)?.slashed,
        Error::ProposerSlashed { index },
    );

    Ok(())
}

pub fn validate_operation_counts<P: Preset>(body: &(impl BeaconBlockBody + ?Sized)) -> Result<()> {
    let limits = [
        (
            "proposer slashings",
            P::MaxProposerSlashings::USIZE,
            body.proposer_slashings().len(),
        ),
        (
            "attester slashings",
            P::MaxAttesterSlashings::USIZE,
            body.attester_slashings().len(),
        ),
        (
            "attestations",
            P::MaxAttestations::USIZE,
            body.attestations().len(),
        ),
        ("deposits", P::MaxDeposits::USIZE, body.deposits().len()),
        (
            "voluntary exits",
            P::MaxVoluntaryExits::USIZE,
            body.voluntary_exits().len(),
        ),
    ];

    for (operation, maximum, in_block) in limits {
        ensure!(
            in_block <= maximum,
            Error::TooManyOperations {
                operation,
                maximum,
                in_block,
            },
        );
    }

    Ok(())
}

pub fn process_operations<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState,
    body: &(impl BeaconBlockBody + ?Sized),
) -> Result<()> {
    validate_operation_counts::<P>(body)?;

    for proposer_slashing in body.proposer_slashings() {
        process_proposer_slashing::<P>(config, state, proposer_slashing)?;
    }

    for attester_slashing in body.attester_slashings() {
        process_attester_slashing::<P>(config, state, attester_slashing)?;
    }

    for attestation in body.attestations() {
        process_attestation::<P>(state, attestation)?;
    }

    for deposit in body.deposits() {
        process_deposit::<P>(state, deposit)?;
    }

    for voluntary_exit in body.voluntary_exits() {
        process_voluntary_exit::<P>(config, state, voluntary_exit)?;
    }

    Ok(())
}

pub fn process_proposer_slashing<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState,
    proposer_slashing: &ProposerSlashing,
) -> Result<()> {
    validate_proposer_slashing::<P>(state, proposer_slashing)?;

    let index = proposer_slashing.signed_header_1.message.proposer_index;

    slash_validator::<P>(config, state, index)
}

pub fn validate_proposer_slashing<P: Preset>(
    state: &impl BeaconState,
    proposer_slashing: &ProposerSlashing,
) -> Result<()> {
    let header_1 = proposer_slashing.signed_header_1.message;
    let header_2 = proposer_slashing.signed_header_2.message;

    // > Verify header slots match
    ensure!(
        header_1.slot == header_2.slot,
        Error::ProposerSlashingSlotMismatch {
            slot_1: header_1.slot,
            slot_2: header_2.slot,
        },
    );

    // > Verify header proposer indices match
    ensure!(
        header_1.proposer_index == header_2.proposer_index,
        Error::ProposerSlashingProposerMismatch {
            proposer_index_1: header_1.proposer_index,
            proposer_index_2: header_2.proposer_index,
        },
    );

    // > Verify the headers are different
    ensure!(
        header_1 != header_2,
        Error::ProposerSlashingHeadersIdentical { header: header_1 },
    );

    // > Verify the proposer is slashable
    let index = header_1.proposer_index;

    ensure!(
        is_slashable_validator(validator(state, index)?, get_current_epoch::<P>(state)),
        Error::ProposerNotSlashable { index },
    );

    Ok(())
}

pub fn process_attester_slashing<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState,
    attester_slashing: &AttesterSlashing,
) -> Result<()> {
    let slashable_indices = validate_attester_slashing::<P>(state, attester_slashing)?;

    for validator_index in slashable_indices {
        slash_validator::<P>(config, state, validator_index)?;
    }

    Ok(())
}

/// Returns the validators that would be slashed by `attester_slashing`.
pub fn validate_attester_slashing<P: Preset>(
    state: &impl BeaconState,
    attester_slashing: &AttesterSlashing,
) -> Result<Vec<ValidatorIndex>> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    ensure!(
        is_slashable_attestation_data(attestation_1.data, attestation_2.data),
        Error::AttestationDataNotSlashable {
            data_1: attestation_1.data,
            data_2: attestation_2.data,
        },
    );

    validate_indexed_attestation(state, attestation_1)?;
    validate_indexed_attestation(state, attestation_2)?;

    let current_epoch = get_current_epoch::<P>(state);

    let slashable_indices = attestation_1
        .attesting_indices
        .iter()
        .filter(|index| attestation_2.attesting_indices.contains(index))
        .copied()
        .filter(|index| {
            validator(state, *index)
                .is_ok_and(|validator| is_slashable_validator(validator, current_epoch))
        })
        .collect_vec();

    ensure!(!slashable_indices.is_empty(), Error::NoAttestersSlashed);

    Ok(slashable_indices)
}

pub fn validate_attestation<P: Preset>(
    state: &impl BeaconState,
    attestation: &Attestation,
) -> Result<()> {
    let data = attestation.data;
    let target_epoch = data.target.epoch;
    let current_epoch = get_current_epoch::<P>(state);
    let previous_epoch = get_previous_epoch::<P>(state);

    ensure!(
        target_epoch == current_epoch || target_epoch == previous_epoch,
        Error::AttestationTargetsInvalidEpoch { target_epoch },
    );

    ensure!(
        target_epoch == compute_epoch_at_slot::<P>(data.slot),
        Error::AttestationTargetsWrongEpoch { data },
    );

    let low_slot = data.slot + P::MIN_ATTESTATION_INCLUSION_DELAY.get();
    let high_slot = data.slot + P::SlotsPerEpoch::U64;

    ensure!(
        (low_slot..=high_slot).contains(&state.slot()),
        Error::AttestationOutsideInclusionRange {
            state_slot: state.slot(),
            attestation_slot: data.slot,
        },
    );

    let in_state = if target_epoch == current_epoch {
        state.current_justified_checkpoint()
    } else {
        state.previous_justified_checkpoint()
    };

    let in_block = data.source;

    ensure!(
        in_state == in_block,
        Error::AttestationSourceMismatch { in_state, in_block },
    );

    let indexed_attestation = get_indexed_attestation::<P>(state, attestation)?;

    validate_indexed_attestation(state, &indexed_attestation)
}

pub fn process_attestation<P: Preset>(
    state: &mut impl BeaconState,
    attestation: &Attestation,
) -> Result<()> {
    validate_attestation::<P>(state, attestation)?;

    let pending_attestation = PendingAttestation {
        aggregation_bits: attestation.aggregation_bits.clone(),
        data: attestation.data,
        inclusion_delay: state.slot() - attestation.data.slot,
        proposer_index: get_beacon_proposer_index::<P>(state)?,
    };

    if attestation.data.target.epoch == get_current_epoch::<P>(state) {
        state
            .current_epoch_attestations_mut()
            .push_back(pending_attestation);
    } else {
        state
            .previous_epoch_attestations_mut()
            .push_back(pending_attestation);
    }

    Ok(())
}

/// Applies a deposit to the registry.
///
/// Deposit proofs are checked against the deposit contract before blocks reach this point.
pub fn process_deposit<P: Preset>(state: &mut impl BeaconState, deposit: &Deposit) -> Result<()> {
    *state.eth1_deposit_index_mut() += 1;

    let existing = state
        .validators()
        .iter()
        .position(|validator| validator.pubkey == deposit.pubkey);

    if let Some(index) = existing {
        // > Increase balance by deposit amount
        increase_balance(balance(state, index as ValidatorIndex)?, deposit.amount);
        return Ok(());
    }

    let increment = P::EFFECTIVE_BALANCE_INCREMENT.get();
    let effective_balance =
        (deposit.amount - deposit.amount % increment).min(P::MAX_EFFECTIVE_BALANCE);

    let activation_epoch = if effective_balance == P::MAX_EFFECTIVE_BALANCE {
        compute_activation_exit_epoch::<P>(get_current_epoch::<P>(state))
    } else {
        FAR_FUTURE_EPOCH
    };

    state.validators_mut().push_back(Validator {
        pubkey: deposit.pubkey.clone(),
        withdrawal_credentials: deposit.withdrawal_credentials,
        effective_balance,
        slashed: false,
        activation_epoch,
        exit_epoch: FAR_FUTURE_EPOCH,
        withdrawable_epoch: FAR_FUTURE_EPOCH,
    });

    state.balances_mut().push_back(deposit.amount);

    Ok(())
}

pub fn process_voluntary_exit<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState,
    signed_voluntary_exit: &SignedVoluntaryExit,
) -> Result<()> {
    validate_voluntary_exit::<P>(config, state, signed_voluntary_exit)?;

    initiate_validator_exit::<P>(
        config,
        state,
        signed_voluntary_exit.message.validator_index,
    )
}

pub fn validate_voluntary_exit<P: Preset>(
    config: &Config,
    state: &impl BeaconState,
    signed_voluntary_exit: &SignedVoluntaryExit,
) -> Result<()> {
    let voluntary_exit = signed_voluntary_exit.message;
    let index = voluntary_exit.validator_index;
    let validator = validator(state, index)?;
    let current_epoch = get_current_epoch::<P>(state);

    // > Verify the validator is active
    ensure!(
        is_active_validator(validator, current_epoch),
        Error::ValidatorNotActive {
            index,
            current_epoch,
        },
    );

    // > Verify exit has not been initiated
    ensure!(
        validator.exit_epoch == FAR_FUTURE_EPOCH,
        Error::ValidatorAlreadyExited {
            index,
            exit_epoch: validator.exit_epoch,
        },
    );

    // > Exits must specify an epoch when they become valid; they are not valid before then
    ensure!(
        current_epoch >= voluntary_exit.epoch,
        Error::VoluntaryExitFromTheFuture {
            epoch: voluntary_exit.epoch,
            current_epoch,
        },
    );

    // > Verify the validator has been active long enough
    ensure!(
        current_epoch >= validator.activation_epoch + config.shard_committee_period,
        Error::ValidatorHasNotBeenActiveLongEnough { index },
    );

    Ok(())
}

pub(crate) fn validator(state: &impl BeaconState, index: ValidatorIndex) -> Result<&Validator> {
    let position = usize::try_from(index)?;

    state
        .validators()
        .get(position)
        .ok_or_else(|| Error::ValidatorUnknown { index }.into())
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState,
            containers::{
                AttestationData, Checkpoint, IndexedAttestation, SignedBeaconBlockHeader,
            },
            primitives::PublicKeyBytes,
        },
        preset::Minimal,
    };

    use super::*;

    fn state() -> Phase0BeaconState {
        let validators = (0..8_u8)
            .map(|byte| Validator {
                pubkey: PublicKeyBytes::from(vec![byte]),
                effective_balance: Minimal::MAX_EFFECTIVE_BALANCE,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
                ..Validator::default()
            })
            .collect();

        Phase0BeaconState {
            slot: 3,
            validators,
            balances: vec![Minimal::MAX_EFFECTIVE_BALANCE; 8].into(),
            ..Phase0BeaconState::default()
        }
    }

    fn header(slot: u64, body_root: H256) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: BeaconBlockHeader {
                slot,
                proposer_index: 5,
                body_root,
                ..BeaconBlockHeader::default()
            },
            ..SignedBeaconBlockHeader::default()
        }
    }

    #[test]
    fn proposer_slashing_slashes_proposer() -> Result<()> {
        let mut state = state();
        let proposer_slashing = ProposerSlashing {
            signed_header_1: header(2, H256::repeat_byte(1)),
            signed_header_2: header(2, H256::repeat_byte(2)),
        };

        process_proposer_slashing::<Minimal>(&Config::minimal(), &mut state, &proposer_slashing)?;

        assert!(state.validators[5].slashed);

        Ok(())
    }

    #[test]
    fn proposer_slashing_with_identical_headers_is_rejected() {
        let state = state();
        let proposer_slashing = ProposerSlashing {
            signed_header_1: header(2, H256::zero()),
            signed_header_2: header(2, H256::zero()),
        };

        let error = validate_proposer_slashing::<Minimal>(&state, &proposer_slashing)
            .expect_err("identical headers are not slashable");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::ProposerSlashingHeadersIdentical { .. }),
        ));
    }

    #[test]
    fn attester_slashing_slashes_intersection() -> Result<()> {
        let data = |root| AttestationData {
            target: Checkpoint { epoch: 0, root },
            ..AttestationData::default()
        };

        let attester_slashing = AttesterSlashing {
            attestation_1: IndexedAttestation {
                attesting_indices: vec![1, 2, 3],
                data: data(H256::repeat_byte(1)),
                ..IndexedAttestation::default()
            },
            attestation_2: IndexedAttestation {
                attesting_indices: vec![2, 3, 4],
                data: data(H256::repeat_byte(2)),
                ..IndexedAttestation::default()
            },
        };

        let mut state = state();

        assert_eq!(
            validate_attester_slashing::<Minimal>(&state, &attester_slashing)?,
            [2, 3],
        );

        process_attester_slashing::<Minimal>(&Config::minimal(), &mut state, &attester_slashing)?;

        let slashed = state
            .validators
            .iter()
            .map(|validator| validator.slashed)
            .collect_vec();

        assert_eq!(
            slashed,
            [false, false, true, true, false, false, false, false],
        );

        Ok(())
    }

    #[test]
    fn deposit_for_new_key_appends_validator() -> Result<()> {
        let mut state = state();
        let deposit = Deposit {
            pubkey: PublicKeyBytes::from(vec![0xff]),
            amount: Minimal::MAX_EFFECTIVE_BALANCE,
            ..Deposit::default()
        };

        process_deposit::<Minimal>(&mut state, &deposit)?;

        assert_eq!(state.validators.len(), 9);
        assert_eq!(state.balances.len(), 9);
        assert_eq!(state.eth1_deposit_index, 1);
        assert_eq!(state.validators[8].activation_epoch, 5);

        Ok(())
    }

    #[test]
    fn deposit_for_existing_key_tops_up_balance() -> Result<()> {
        let mut state = state();
        let deposit = Deposit {
            pubkey: PublicKeyBytes::from(vec![3]),
            amount: 1_000,
            ..Deposit::default()
        };

        process_deposit::<Minimal>(&mut state, &deposit)?;

        assert_eq!(state.validators.len(), 8);
        assert_eq!(state.balances[3], Minimal::MAX_EFFECTIVE_BALANCE + 1_000);

        Ok(())
    }

    #[test]
    fn voluntary_exit_requires_minimum_activity() {
        let state = state();
        let exit = SignedVoluntaryExit::default();

        let result = validate_voluntary_exit::<Minimal>(&Config::minimal(), &state, &exit);

        assert!(result.is_err());
    }
}
