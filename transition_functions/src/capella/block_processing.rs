use anyhow::{ensure, Result};
use helper_functions::misc::compute_timestamp_at_slot;
use typenum::Unsigned as _;
use types::{
    capella::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, BeaconBlockBody, SignedBlsToExecutionChange},
    },
    config::Config,
    hashing,
    phase0::{
        consts::{BLS_WITHDRAWAL_PREFIX, ETH1_ADDRESS_WITHDRAWAL_PREFIX},
        primitives::H256,
    },
    preset::Preset,
};

use crate::unphased::{self, Error};

pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    block: &BeaconBlock,
) -> Result<()> {
    unphased::process_block_header::<P>(state, block)?;
    process_execution_payload(config, state, &block.body)?;
    process_operations::<P>(config, state, &block.body)
}

/// Checks the payload against the beacon state and caches its header.
///
/// Validity of the payload itself is decided by the execution engine, which is consulted
/// separately by the caller.
pub fn process_execution_payload(
    config: &Config,
    state: &mut BeaconState,
    body: &BeaconBlockBody,
) -> Result<()> {
    let payload = &body.execution_payload;
    let in_state = state.latest_execution_payload_header.block_hash;

    // > Verify consistency of the parent hash with respect to the previous execution payload header
    if !in_state.is_zero() {
        ensure!(
            payload.parent_hash == in_state,
            Error::ExecutionPayloadParentHashMismatch {
                in_state,
                in_block: payload.parent_hash,
            },
        );
    }

    // > Verify timestamp
    let computed = compute_timestamp_at_slot(config, state, state.slot);
    let in_block = payload.timestamp;

    ensure!(
        computed == in_block,
        Error::ExecutionPayloadTimestampMismatch { computed, in_block },
    );

    // > Cache execution payload header
    state.latest_execution_payload_header = payload.to_header();

    Ok(())
}

pub fn process_operations<P: Preset>(
    config: &Config,
    state: &mut BeaconState,
    body: &BeaconBlockBody,
) -> Result<()> {
    let maximum = P::MaxBlsToExecutionChanges::USIZE;
    let in_block = body.bls_to_execution_changes.len();

    ensure!(
        in_block <= maximum,
        Error::TooManyOperations {
            operation: "BLS to execution changes",
            maximum,
            in_block,
        },
    );

    unphased::process_operations::<P>(config, state, body)?;

    for bls_to_execution_change in &body.bls_to_execution_changes {
        process_bls_to_execution_change(state, bls_to_execution_change)?;
    }

    Ok(())
}

pub fn validate_bls_to_execution_change(
    state: &BeaconState,
    signed_address_change: &SignedBlsToExecutionChange,
) -> Result<()> {
    let address_change = &signed_address_change.message;
    let index = address_change.validator_index;
    let validator = unphased::validator(state, index)?;
    let credentials = validator.withdrawal_credentials.as_bytes();

    ensure!(
        credentials[..BLS_WITHDRAWAL_PREFIX.len()] == *BLS_WITHDRAWAL_PREFIX,
        Error::BlsToExecutionChangeCredentialsNotBls { index },
    );

    let public_key_hash = hashing::digest(&address_change.from_pubkey);
    let prefix_length = BLS_WITHDRAWAL_PREFIX.len();

    ensure!(
        credentials[prefix_length..] == public_key_hash[prefix_length..],
        Error::BlsToExecutionChangePublicKeyMismatch { index },
    );

    Ok(())
}

pub fn process_bls_to_execution_change(
    state: &mut BeaconState,
    signed_address_change: &SignedBlsToExecutionChange,
) -> Result<()> {
    validate_bls_to_execution_change(state, signed_address_change)?;

    let address_change = &signed_address_change.message;
    let position = usize::try_from(address_change.validator_index)?;

    let mut withdrawal_credentials = H256::zero();
    let bytes = withdrawal_credentials.as_bytes_mut();
    let prefix_length = ETH1_ADDRESS_WITHDRAWAL_PREFIX.len();

    bytes[..prefix_length].copy_from_slice(ETH1_ADDRESS_WITHDRAWAL_PREFIX);
    bytes[H256::len_bytes() - 20..].copy_from_slice(address_change.to_execution_address.as_bytes());

    if let Some(validator) = state.validators.get_mut(position) {
        validator.withdrawal_credentials = withdrawal_credentials;
    }

    Ok(())
}
