use thiserror::Error;
use types::{
    nonstandard::Phase,
    phase0::{
        containers::{AttestationData, BeaconBlockHeader, Checkpoint},
        primitives::{Epoch, ExecutionBlockHash, Slot, UnixSeconds, ValidatorIndex, H256},
    },
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("attestation data is not slashable (data_1: {data_1:?}, data_2: {data_2:?})")]
    AttestationDataNotSlashable {
        data_1: AttestationData,
        data_2: AttestationData,
    },
    #[error(
        "attestation in slot {attestation_slot} is outside \
         inclusion range for state at slot {state_slot}"
    )]
    AttestationOutsideInclusionRange {
        state_slot: Slot,
        attestation_slot: Slot,
    },
    #[error(
        "attestation source does not match justified checkpoint \
         (in_state: {in_state:?}, in_block: {in_block:?})"
    )]
    AttestationSourceMismatch {
        in_state: Checkpoint,
        in_block: Checkpoint,
    },
    #[error("attestation targets epoch {target_epoch} which is neither current nor previous")]
    AttestationTargetsInvalidEpoch { target_epoch: Epoch },
    #[error("attestation votes for a checkpoint in the wrong epoch: {data:?}")]
    AttestationTargetsWrongEpoch { data: AttestationData },
    #[error("block is not newer than latest block header ({block_slot} <= {block_header_slot})")]
    BlockNotNewerThanLatestBlockHeader {
        block_slot: Slot,
        block_header_slot: Slot,
    },
    #[error("validator {index} does not have BLS withdrawal credentials")]
    BlsToExecutionChangeCredentialsNotBls { index: ValidatorIndex },
    #[error(
        "public key in BLS to execution change does not match credentials of validator {index}"
    )]
    BlsToExecutionChangePublicKeyMismatch { index: ValidatorIndex },
    #[error(
        "execution payload parent hash ({in_block:?}) \
         does not match latest payload header ({in_state:?})"
    )]
    ExecutionPayloadParentHashMismatch {
        in_state: ExecutionBlockHash,
        in_block: ExecutionBlockHash,
    },
    #[error(
        "execution payload timestamp is incorrect (computed: {computed}, in_block: {in_block})"
    )]
    ExecutionPayloadTimestampMismatch {
        computed: UnixSeconds,
        in_block: UnixSeconds,
    },
    #[error(
        "historical root vectors have wrong length \
         (expected: {expected}, block_roots: {block_roots}, state_roots: {state_roots})"
    )]
    HistoryLengthMismatch {
        expected: usize,
        block_roots: usize,
        state_roots: usize,
    },
    #[error("no attesters slashed")]
    NoAttestersSlashed,
    #[error("block parent root ({in_block:?}) does not match latest block header ({computed:?})")]
    ParentRootMismatch { computed: H256, in_block: H256 },
    #[error("state is in {state_phase} but block is in {block_phase}")]
    PhaseMismatch {
        state_phase: Phase,
        block_phase: Phase,
    },
    #[error("proposer (validator {index}) is slashed")]
    ProposerSlashed { index: ValidatorIndex },
    #[error("proposer index is incorrect (in_block: {in_block}, computed: {computed})")]
    ProposerIndexMismatch {
        computed: ValidatorIndex,
        in_block: ValidatorIndex,
    },
    #[error("proposer (validator {index}) is not slashable")]
    ProposerNotSlashable { index: ValidatorIndex },
    #[error("block headers in proposer slashing are identical: {header:?}")]
    ProposerSlashingHeadersIdentical { header: BeaconBlockHeader },
    #[error(
        "proposer indices in proposer slashing do not match \
         ({proposer_index_1} != {proposer_index_2})"
    )]
    ProposerSlashingProposerMismatch {
        proposer_index_1: ValidatorIndex,
        proposer_index_2: ValidatorIndex,
    },
    #[error("slots in proposer slashing do not match ({slot_1} != {slot_2})")]
    ProposerSlashingSlotMismatch { slot_1: Slot, slot_2: Slot },
    #[error("block slot ({block_slot}) does not match state slot ({state_slot})")]
    SlotMismatch { state_slot: Slot, block_slot: Slot },
    #[error("target slot ({target}) is not later than current slot ({current})")]
    SlotNotLater { current: Slot, target: Slot },
    #[error("state root in block ({in_block:?}) does not match state ({computed:?})")]
    StateRootMismatch { computed: H256, in_block: H256 },
    #[error("block contains too many {operation} (maximum: {maximum}, in_block: {in_block})")]
    TooManyOperations {
        operation: &'static str,
        maximum: usize,
        in_block: usize,
    },
    #[error("validator {index} exited in epoch {exit_epoch}")]
    ValidatorAlreadyExited { index: ValidatorIndex, exit_epoch: Epoch },
    #[error("validator {index} has not been active long enough to exit")]
    ValidatorHasNotBeenActiveLongEnough { index: ValidatorIndex },
    #[error("validator {index} is not active in epoch {current_epoch}")]
    ValidatorNotActive {
        index: ValidatorIndex,
        current_epoch: Epoch,
    },
    #[error("validator {index} is not in the registry")]
    ValidatorUnknown { index: ValidatorIndex },
    #[error("voluntary exit is from the future (epoch: {epoch}, current_epoch: {current_epoch})")]
    VoluntaryExitFromTheFuture { epoch: Epoch, current_epoch: Epoch },
}
