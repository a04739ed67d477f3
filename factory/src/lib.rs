//! Builders for genesis states and blocks used in tests and benchmarks.
//!
//! Blocks produced here carry placeholder signatures and are valid with respect to the state
//! transition in `transition_functions`.

use core::ops::Range;
use std::sync::Arc;

use anyhow::{ensure, Result};
use bitvec::{bitvec, order::Lsb0};
use helper_functions::{
    accessors::{
        self, get_committee_count_per_slot, get_current_epoch, latest_block_root,
    },
    misc::{self, compute_epoch_at_slot, compute_start_slot_at_epoch},
};
use im::Vector;
use itertools::Itertools as _;
use std_ext::ArcExt as _;
use transition_functions::combined;
use typenum::Unsigned as _;
use types::{
    capella::{
        beacon_state::BeaconState as CapellaBeaconState,
        containers::{
            BeaconBlock as CapellaBeaconBlock, BeaconBlockBody as CapellaBeaconBlockBody,
            ExecutionPayload, ExecutionPayloadHeader, SignedBlsToExecutionChange,
        },
    },
    combined::{BeaconBlock, BeaconState, SignedBeaconBlock},
    config::Config,
    hashing::{self, HashTreeRoot as _},
    nonstandard::Phase,
    phase0::{
        beacon_state::{BeaconState as Phase0BeaconState, Fork},
        consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH, GENESIS_SLOT},
        containers::{
            Attestation, AttestationData, AttesterSlashing, BeaconBlock as Phase0BeaconBlock,
            BeaconBlockBody as Phase0BeaconBlockBody, BeaconBlockHeader, Checkpoint, Deposit,
            ProposerSlashing, SignedVoluntaryExit, Validator,
        },
        primitives::{
            Epoch, ExecutionBlockHash, Gwei, PublicKeyBytes, SignatureBytes, Slot, ValidatorIndex,
            H256,
        },
    },
    preset::Preset,
    traits::BeaconState as _,
};

/// Operations to include in a block built by [`block_with_contents`].
///
/// A payload is generated for Capella blocks when `execution_payload` is `None`.
#[derive(Clone, Default, Debug)]
pub struct BlockContents {
    pub proposer_slashings: Vec<ProposerSlashing>,
    pub attester_slashings: Vec<AttesterSlashing>,
    pub attestations: Vec<Attestation>,
    pub deposits: Vec<Deposit>,
    pub voluntary_exits: Vec<SignedVoluntaryExit>,
    pub bls_to_execution_changes: Vec<SignedBlsToExecutionChange>,
    pub execution_payload: Option<ExecutionPayload>,
}

#[must_use]
pub fn interop_public_key(validator_index: ValidatorIndex) -> PublicKeyBytes {
    PublicKeyBytes(validator_index.to_le_bytes().to_vec())
}

#[must_use]
pub fn interop_signature(validator_index: ValidatorIndex) -> SignatureBytes {
    SignatureBytes(hashing::digest(&validator_index).as_bytes().to_vec())
}

/// Builds a deposit for a new validator identified by `validator_index`.
#[must_use]
pub fn deposit(validator_index: ValidatorIndex, amount: Gwei) -> Deposit {
    let pubkey = interop_public_key(validator_index);

    Deposit {
        withdrawal_credentials: misc::bls_withdrawal_credentials(&pubkey),
        pubkey,
        amount,
        signature: interop_signature(validator_index),
    }
}

/// Builds a genesis state with `config.min_genesis_active_validator_count` validators.
///
/// The phase of the state is the one scheduled for the genesis epoch.
pub fn min_genesis_state<P: Preset>(config: &Config) -> Result<Arc<BeaconState>> {
    let validator_count = config.min_genesis_active_validator_count.get();
    let phase = config.phase_at_epoch(GENESIS_EPOCH);
    let version = config.version(phase);

    let validators = (0..validator_count)
        .map(|index| {
            let pubkey = interop_public_key(index);

            Validator {
                withdrawal_credentials: misc::bls_withdrawal_credentials(&pubkey),
                pubkey,
                effective_balance: P::MAX_EFFECTIVE_BALANCE,
                slashed: false,
                activation_epoch: GENESIS_EPOCH,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
            }
        })
        .collect::<Vector<_>>();

    let history = vec![H256::zero(); P::SlotsPerHistoricalRoot::USIZE];

    let body_root = match phase {
        Phase::Phase0 => Phase0BeaconBlockBody::default().hash_tree_root(),
        Phase::Capella => CapellaBeaconBlockBody::default().hash_tree_root(),
    };

    let phase0_state = Phase0BeaconState {
        genesis_time: config.min_genesis_time,
        genesis_validators_root: hashing::digest(&validators),
        slot: GENESIS_SLOT,
        fork: Fork {
            previous_version: version,
            current_version: version,
            epoch: GENESIS_EPOCH,
        },
        latest_block_header: BeaconBlockHeader {
            body_root,
            ..BeaconBlockHeader::default()
        },
        block_roots: history.clone().into(),
        state_roots: history.into(),
        eth1_deposit_index: validator_count,
        balances: vec![P::MAX_EFFECTIVE_BALANCE; validators.len()].into(),
        validators,
        ..Phase0BeaconState::default()
    };

    let state = match phase {
        Phase::Phase0 => phase0_state.into(),
        Phase::Capella => {
            let Phase0BeaconState {
                genesis_time,
                genesis_validators_root,
                slot,
                fork,
                latest_block_header,
                block_roots,
                state_roots,
                eth1_deposit_index,
                validators,
                balances,
                previous_epoch_attestations,
                current_epoch_attestations,
                justification_bits,
                previous_justified_checkpoint,
                current_justified_checkpoint,
                finalized_checkpoint,
            } = phase0_state;

            CapellaBeaconState {
                genesis_time,
                genesis_validators_root,
                slot,
                fork,
                latest_block_header,
                block_roots,
                state_roots,
                eth1_deposit_index,
                validators,
                balances,
                previous_epoch_attestations,
                current_epoch_attestations,
                justification_bits,
                previous_justified_checkpoint,
                current_justified_checkpoint,
                finalized_checkpoint,
                latest_execution_payload_header: ExecutionPayloadHeader {
                    block_hash: genesis_execution_block_hash(config),
                    timestamp: genesis_time,
                    ..ExecutionPayloadHeader::default()
                },
            }
            .into()
        }
    };

    Ok(Arc::new(state))
}

/// Builds the block whose root is recorded in `genesis_state` as the latest block.
#[must_use]
pub fn genesis_block(genesis_state: &BeaconState) -> Arc<SignedBeaconBlock> {
    let state_root = genesis_state.hash_tree_root();

    let block: BeaconBlock = match genesis_state {
        BeaconState::Phase0(_) => Phase0BeaconBlock {
            state_root,
            ..Phase0BeaconBlock::default()
        }
        .into(),
        BeaconState::Capella(_) => CapellaBeaconBlock {
            state_root,
            ..CapellaBeaconBlock::default()
        }
        .into(),
    };

    Arc::new(block.with_signature(SignatureBytes::default()))
}

pub fn empty_block<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState>,
    slot: Slot,
    graffiti: H256,
) -> Result<(Arc<SignedBeaconBlock>, Arc<BeaconState>)> {
    block_with_contents::<P>(config, pre_state, slot, graffiti, BlockContents::default())
}

pub fn block_with_payload<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState>,
    slot: Slot,
    graffiti: H256,
    execution_payload: ExecutionPayload,
) -> Result<(Arc<SignedBeaconBlock>, Arc<BeaconState>)> {
    let contents = BlockContents {
        execution_payload: Some(execution_payload),
        ..BlockContents::default()
    };

    block_with_contents::<P>(config, pre_state, slot, graffiti, contents)
}

/// Builds a block at `slot` on top of `pre_state` and returns it with its post-state.
///
/// Empty slots between `pre_state` and `slot` are processed first.
pub fn block_with_contents<P: Preset>(
    config: &Config,
    mut state: Arc<BeaconState>,
    slot: Slot,
    graffiti: H256,
    contents: BlockContents,
) -> Result<(Arc<SignedBeaconBlock>, Arc<BeaconState>)> {
    if state.slot() < slot {
        combined::process_slots::<P>(config, state.make_mut(), slot)?;
    }

    let proposer_index = accessors::get_beacon_proposer_index::<P>(&*state)?;
    let parent_root = latest_block_root(&*state);

    let BlockContents {
        proposer_slashings,
        attester_slashings,
        attestations,
        deposits,
        voluntary_exits,
        bls_to_execution_changes,
        execution_payload,
    } = contents;

    let mut block: BeaconBlock = match state.phase() {
        Phase::Phase0 => Phase0BeaconBlock {
            slot,
            proposer_index,
            parent_root,
            state_root: H256::zero(),
            body: Phase0BeaconBlockBody {
                graffiti,
                proposer_slashings,
                attester_slashings,
                attestations,
                deposits,
                voluntary_exits,
                ..Phase0BeaconBlockBody::default()
            },
        }
        .into(),
        Phase::Capella => {
            let execution_payload = match execution_payload {
                Some(payload) => payload,
                None => {
                    let block_hash = hashing::digest(&(parent_root, slot, graffiti));
                    self::execution_payload(config, &state, slot, block_hash)?
                }
            };

            CapellaBeaconBlock {
                slot,
                proposer_index,
                parent_root,
                state_root: H256::zero(),
                body: CapellaBeaconBlockBody {
                    graffiti,
                    proposer_slashings,
                    attester_slashings,
                    attestations,
                    deposits,
                    voluntary_exits,
                    execution_payload,
                    bls_to_execution_changes,
                    ..CapellaBeaconBlockBody::default()
                },
            }
            .into()
        }
    };

    combined::process_block::<P>(config, state.make_mut(), &block)?;

    block.set_state_root(state.hash_tree_root());

    let signed_block = block.with_signature(interop_signature(proposer_index));

    Ok((Arc::new(signed_block), state))
}

/// Builds a payload that extends the latest payload recorded in `state`.
pub fn execution_payload(
    config: &Config,
    state: &BeaconState,
    slot: Slot,
    block_hash: ExecutionBlockHash,
) -> Result<ExecutionPayload> {
    let header = state
        .post_capella()
        .map(|state| state.latest_execution_payload_header)
        .ok_or_else(|| anyhow::anyhow!("execution payloads require a Capella state"))?;

    Ok(ExecutionPayload {
        parent_hash: header.block_hash,
        block_number: header.block_number + 1,
        timestamp: misc::compute_timestamp_at_slot(config, state, slot),
        block_hash,
        ..ExecutionPayload::default()
    })
}

/// Builds a block in the last slot of `epoch` with attestations from every committee in the
/// preceding slots of the epoch.
///
/// Attestations for the block's own slot cannot be included, which still leaves more than
/// two thirds of the active balance attesting to `epoch`.
pub fn block_justifying_current_epoch<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState>,
    epoch: Epoch,
    graffiti: H256,
    execution_payload: Option<ExecutionPayload>,
) -> Result<(Arc<SignedBeaconBlock>, Arc<BeaconState>)> {
    let epoch_start = compute_start_slot_at_epoch::<P>(epoch);
    let slot = compute_start_slot_at_epoch::<P>(epoch + 1) - 1;

    let mut state = pre_state;

    if state.slot() < slot {
        combined::process_slots::<P>(config, state.make_mut(), slot)?;
    }

    let attestations = full_attestations::<P>(&state, epoch_start..slot)?;

    let contents = BlockContents {
        attestations,
        execution_payload,
        ..BlockContents::default()
    };

    block_with_contents::<P>(config, state, slot, graffiti, contents)
}

/// Builds a block in the first slot after `epoch` with attestations from every committee in
/// `epoch`.
pub fn block_justifying_previous_epoch<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState>,
    epoch: Epoch,
    graffiti: H256,
) -> Result<(Arc<SignedBeaconBlock>, Arc<BeaconState>)> {
    let slot = compute_start_slot_at_epoch::<P>(epoch + 1);

    let mut state = pre_state;

    if state.slot() < slot {
        combined::process_slots::<P>(config, state.make_mut(), slot)?;
    }

    let attestations =
        full_attestations::<P>(&state, compute_start_slot_at_epoch::<P>(epoch)..slot)?;

    let contents = BlockContents {
        attestations,
        ..BlockContents::default()
    };

    block_with_contents::<P>(config, state, slot, graffiti, contents)
}

/// Builds a block at `slot` that includes attestations from every committee of the previous slot.
pub fn full_block<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState>,
    slot: Slot,
) -> Result<(Arc<SignedBeaconBlock>, Arc<BeaconState>)> {
    let mut state = pre_state;

    if state.slot() < slot {
        combined::process_slots::<P>(config, state.make_mut(), slot)?;
    }

    let attestations = match slot.checked_sub(1) {
        Some(previous_slot) => full_attestations::<P>(&state, previous_slot..slot)?,
        None => vec![],
    };

    let contents = BlockContents {
        attestations,
        ..BlockContents::default()
    };

    block_with_contents::<P>(config, state, slot, H256::zero(), contents)
}

/// Builds a block for every slot after `pre_state` up to and including the first slot of `epoch`.
///
/// Every block includes full attestations for the slot before it, which is enough for epochs to
/// be justified and finalized as soon as the state transition allows.
pub fn full_blocks_up_to_epoch<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState>,
    epoch: Epoch,
) -> Result<(Vec<Arc<SignedBeaconBlock>>, Arc<BeaconState>)> {
    let last_slot = compute_start_slot_at_epoch::<P>(epoch);

    ensure!(
        pre_state.slot() < last_slot,
        "pre-state is already at slot {} (target slot: {last_slot})",
        pre_state.slot(),
    );

    let mut state = pre_state;
    let mut blocks = vec![];

    for slot in state.slot() + 1..=last_slot {
        let (block, post_state) = full_block::<P>(config, state, slot)?;
        blocks.push(block);
        state = post_state;
    }

    Ok((blocks, state))
}

/// Builds attestations from every committee in `slots`.
///
/// `state` must already be at the slot of the block that will include them.
pub fn full_attestations<P: Preset>(
    state: &BeaconState,
    slots: Range<Slot>,
) -> Result<Vec<Attestation>> {
    slots
        .map(|slot| {
            let epoch = compute_epoch_at_slot::<P>(slot);
            let committee_count = get_committee_count_per_slot::<P>(state, epoch);

            (0..committee_count)
                .map(|index| {
                    let committee = accessors::beacon_committee::<P>(state, slot, index)?;
                    let data = attestation_data::<P>(state, slot, index)?;

                    Ok(Attestation {
                        aggregation_bits: bitvec![u8, Lsb0; 1; committee.len()],
                        data,
                        signatures: committee.into_iter().map(interop_signature).collect(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .flatten_ok()
        .collect()
}

/// Builds an attestation to the head of `state` from a single validator in `epoch`.
///
/// The attestation is for the first slot in `epoch` at which `validator_index` is a member of a
/// committee. `state` must be at or after that slot.
pub fn singular_attestation<P: Preset>(
    state: &BeaconState,
    epoch: Epoch,
    validator_index: ValidatorIndex,
) -> Result<Attestation> {
    let committee_count = get_committee_count_per_slot::<P>(state, epoch);

    for slot in misc::slots_in_epoch::<P>(epoch) {
        for index in 0..committee_count {
            let committee = accessors::beacon_committee::<P>(state, slot, index)?;

            if let Some(position) = committee.iter().position(|member| *member == validator_index)
            {
                let mut aggregation_bits = bitvec![u8, Lsb0; 0; committee.len()];
                aggregation_bits.set(position, true);

                return Ok(Attestation {
                    aggregation_bits,
                    data: attestation_data::<P>(state, slot, index)?,
                    signatures: vec![interop_signature(validator_index)],
                });
            }
        }
    }

    anyhow::bail!("validator {validator_index} is not in any committee in epoch {epoch}")
}

fn attestation_data<P: Preset>(
    state: &BeaconState,
    slot: Slot,
    index: u64,
) -> Result<AttestationData> {
    let epoch = compute_epoch_at_slot::<P>(slot);
    let epoch_start = compute_start_slot_at_epoch::<P>(epoch);

    let root_at = |slot: Slot| {
        if slot < state.slot() {
            accessors::get_block_root_at_slot::<P>(state, slot)
        } else {
            Ok(latest_block_root(state))
        }
    };

    let source = if epoch < get_current_epoch::<P>(state) {
        state.previous_justified_checkpoint()
    } else {
        state.current_justified_checkpoint()
    };

    Ok(AttestationData {
        slot,
        index,
        beacon_block_root: root_at(slot)?,
        source,
        target: Checkpoint {
            epoch,
            root: root_at(epoch_start)?,
        },
    })
}

fn genesis_execution_block_hash(config: &Config) -> ExecutionBlockHash {
    hashing::digest(&(config.config_name.as_ref(), config.min_genesis_time))
}
