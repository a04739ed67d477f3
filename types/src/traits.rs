//! Accessors shared by all phases.
//!
//! Phase-specific containers implement these traits directly. The tagged unions in
//! [`crate::combined`] implement them by dispatching on the variant.

use duplicate::duplicate_item;
use im::Vector;

use crate::{
    capella::{
        beacon_state::BeaconState as CapellaBeaconState,
        containers::{
            BeaconBlock as CapellaBeaconBlock, BeaconBlockBody as CapellaBeaconBlockBody,
            ExecutionPayload, ExecutionPayloadHeader,
            SignedBeaconBlock as CapellaSignedBeaconBlock, SignedBlsToExecutionChange,
            SyncAggregate,
        },
    },
    hashing::HashTreeRoot,
    phase0::{
        beacon_state::{BeaconState as Phase0BeaconState, Fork, JustificationBits},
        containers::{
            Attestation, AttesterSlashing, BeaconBlock as Phase0BeaconBlock,
            BeaconBlockBody as Phase0BeaconBlockBody, BeaconBlockHeader, Checkpoint, Deposit,
            PendingAttestation, ProposerSlashing, SignedBeaconBlock as Phase0SignedBeaconBlock,
            SignedVoluntaryExit, Validator,
        },
        primitives::{
            DepositIndex, Gwei, SignatureBytes, Slot, UnixSeconds, ValidatorIndex, H256,
        },
    },
};

pub trait BeaconState: Clone + Send + Sync + HashTreeRoot {
    fn genesis_time(&self) -> UnixSeconds;
    fn genesis_validators_root(&self) -> H256;
    fn slot(&self) -> Slot;
    fn slot_mut(&mut self) -> &mut Slot;
    fn fork(&self) -> Fork;
    fn fork_mut(&mut self) -> &mut Fork;
    fn latest_block_header(&self) -> BeaconBlockHeader;
    fn latest_block_header_mut(&mut self) -> &mut BeaconBlockHeader;
    fn block_roots(&self) -> &Vector<H256>;
    fn block_roots_mut(&mut self) -> &mut Vector<H256>;
    fn state_roots(&self) -> &Vector<H256>;
    fn state_roots_mut(&mut self) -> &mut Vector<H256>;
    fn eth1_deposit_index(&self) -> DepositIndex;
    fn eth1_deposit_index_mut(&mut self) -> &mut DepositIndex;
    fn validators(&self) -> &Vector<Validator>;
    fn validators_mut(&mut self) -> &mut Vector<Validator>;
    fn balances(&self) -> &Vector<Gwei>;
    fn balances_mut(&mut self) -> &mut Vector<Gwei>;
    fn previous_epoch_attestations(&self) -> &Vector<PendingAttestation>;
    fn previous_epoch_attestations_mut(&mut self) -> &mut Vector<PendingAttestation>;
    fn current_epoch_attestations(&self) -> &Vector<PendingAttestation>;
    fn current_epoch_attestations_mut(&mut self) -> &mut Vector<PendingAttestation>;
    fn justification_bits(&self) -> JustificationBits;
    fn justification_bits_mut(&mut self) -> &mut JustificationBits;
    fn previous_justified_checkpoint(&self) -> Checkpoint;
    fn previous_justified_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn current_justified_checkpoint(&self) -> Checkpoint;
    fn current_justified_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn finalized_checkpoint(&self) -> Checkpoint;
    fn finalized_checkpoint_mut(&mut self) -> &mut Checkpoint;
}

pub trait PostCapellaBeaconState: BeaconState {
    fn latest_execution_payload_header(&self) -> &ExecutionPayloadHeader;
    fn latest_execution_payload_header_mut(&mut self) -> &mut ExecutionPayloadHeader;
}

#[duplicate_item(
    implementor;
    [Phase0BeaconState];
    [CapellaBeaconState];
)]
impl BeaconState for implementor {
    fn genesis_time(&self) -> UnixSeconds {
        self.genesis_time
    }

    fn genesis_validators_root(&self) -> H256 {
        self.genesis_validators_root
    }

    fn slot(&self) -> Slot {
        self.slot
    }

    fn slot_mut(&mut self) -> &mut Slot {
        &mut self.slot
    }

    fn fork(&self) -> Fork {
        self.fork
    }

    fn fork_mut(&mut self) -> &mut Fork {
        &mut self.fork
    }

    fn latest_block_header(&self) -> BeaconBlockHeader {
        self.latest_block_header
    }

    fn latest_block_header_mut(&mut self) -> &mut BeaconBlockHeader {
        &mut self.latest_block_header
    }

    fn block_roots(&self) -> &Vector<H256> {
        &self.block_roots
    }

    fn block_roots_mut(&mut self) -> &mut Vector<H256> {
        &mut self.block_roots
    }

    fn state_roots(&self) -> &Vector<H256> {
        &self.state_roots
    }

    fn state_roots_mut(&mut self) -> &mut Vector<H256> {
        &mut self.state_roots
    }

    fn eth1_deposit_index(&self) -> DepositIndex {
        self.eth1_deposit_index
    }

    fn eth1_deposit_index_mut(&mut self) -> &mut DepositIndex {
        &mut self.eth1_deposit_index
    }

    fn validators(&self) -> &Vector<Validator> {
        &self.validators
    }

    fn validators_mut(&mut self) -> &mut Vector<Validator> {
        &mut self.validators
    }

    fn balances(&self) -> &Vector<Gwei> {
        &self.balances
    }

    fn balances_mut(&mut self) -> &mut Vector<Gwei> {
        &mut self.balances
    }

    fn previous_epoch_attestations(&self) -> &Vector<PendingAttestation> {
        &self.previous_epoch_attestations
    }

    fn previous_epoch_attestations_mut(&mut self) -> &mut Vector<PendingAttestation> {
        &mut self.previous_epoch_attestations
    }

    fn current_epoch_attestations(&self) -> &Vector<PendingAttestation> {
        &self.current_epoch_attestations
    }

    fn current_epoch_attestations_mut(&mut self) -> &mut Vector<PendingAttestation> {
        &mut self.current_epoch_attestations
    }

    fn justification_bits(&self) -> JustificationBits {
        self.justification_bits
    }

    fn justification_bits_mut(&mut self) -> &mut JustificationBits {
        &mut self.justification_bits
    }

    fn previous_justified_checkpoint(&self) -> Checkpoint {
        self.previous_justified_checkpoint
    }

    fn previous_justified_checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.previous_justified_checkpoint
    }

    fn current_justified_checkpoint(&self) -> Checkpoint {
        self.current_justified_checkpoint
    }

    fn current_justified_checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.current_justified_checkpoint
    }

    fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    fn finalized_checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.finalized_checkpoint
    }
}

impl PostCapellaBeaconState for CapellaBeaconState {
    fn latest_execution_payload_header(&self) -> &ExecutionPayloadHeader {
        &self.latest_execution_payload_header
    }

    fn latest_execution_payload_header_mut(&mut self) -> &mut ExecutionPayloadHeader {
        &mut self.latest_execution_payload_header
    }
}

pub trait BeaconBlockBody: HashTreeRoot {
    fn randao_reveal(&self) -> &SignatureBytes;
    fn graffiti(&self) -> H256;
    fn proposer_slashings(&self) -> &[ProposerSlashing];
    fn attester_slashings(&self) -> &[AttesterSlashing];
    fn attestations(&self) -> &[Attestation];
    fn deposits(&self) -> &[Deposit];
    fn voluntary_exits(&self) -> &[SignedVoluntaryExit];

    fn post_capella(&self) -> Option<&dyn PostCapellaBeaconBlockBody> {
        None
    }
}

pub trait PostCapellaBeaconBlockBody: BeaconBlockBody {
    fn sync_aggregate(&self) -> &SyncAggregate;
    fn execution_payload(&self) -> &ExecutionPayload;
    fn bls_to_execution_changes(&self) -> &[SignedBlsToExecutionChange];
}

#[duplicate_item(
    implementor                 post_capella_body;
    [Phase0BeaconBlockBody]     [None];
    [CapellaBeaconBlockBody]    [Some(self)];
)]
impl BeaconBlockBody for implementor {
    fn randao_reveal(&self) -> &SignatureBytes {
        &self.randao_reveal
    }

    fn graffiti(&self) -> H256 {
        self.graffiti
    }

    fn proposer_slashings(&self) -> &[ProposerSlashing] {
        &self.proposer_slashings
    }

    fn attester_slashings(&self) -> &[AttesterSlashing] {
        &self.attester_slashings
    }

    fn attestations(&self) -> &[Attestation] {
        &self.attestations
    }

    fn deposits(&self) -> &[Deposit] {
        &self.deposits
    }

    fn voluntary_exits(&self) -> &[SignedVoluntaryExit] {
        &self.voluntary_exits
    }

    fn post_capella(&self) -> Option<&dyn PostCapellaBeaconBlockBody> {
        post_capella_body
    }
}

impl PostCapellaBeaconBlockBody for CapellaBeaconBlockBody {
    fn sync_aggregate(&self) -> &SyncAggregate {
        &self.sync_aggregate
    }

    fn execution_payload(&self) -> &ExecutionPayload {
        &self.execution_payload
    }

    fn bls_to_execution_changes(&self) -> &[SignedBlsToExecutionChange] {
        &self.bls_to_execution_changes
    }
}

/// The root of a block is the root of its header.
///
/// The header commits to the body through `body_root`, which makes the root of a block equal to
/// the root of `state.latest_block_header` once the state root has been filled in.
pub trait BeaconBlock: HashTreeRoot {
    fn slot(&self) -> Slot;
    fn proposer_index(&self) -> ValidatorIndex;
    fn parent_root(&self) -> H256;
    fn state_root(&self) -> H256;
    fn body(&self) -> &dyn BeaconBlockBody;

    fn to_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot(),
            proposer_index: self.proposer_index(),
            parent_root: self.parent_root(),
            state_root: self.state_root(),
            body_root: self.body().hash_tree_root(),
        }
    }
}

#[duplicate_item(
    implementor;
    [Phase0BeaconBlock];
    [CapellaBeaconBlock];
)]
impl BeaconBlock for implementor {
    fn slot(&self) -> Slot {
        self.slot
    }

    fn proposer_index(&self) -> ValidatorIndex {
        self.proposer_index
    }

    fn parent_root(&self) -> H256 {
        self.parent_root
    }

    fn state_root(&self) -> H256 {
        self.state_root
    }

    fn body(&self) -> &dyn BeaconBlockBody {
        &self.body
    }
}

#[duplicate_item(
    implementor;
    [Phase0BeaconBlock];
    [CapellaBeaconBlock];
)]
impl HashTreeRoot for implementor {
    fn hash_tree_root(&self) -> H256 {
        self.to_header().hash_tree_root()
    }
}

pub trait SignedBeaconBlock {
    fn message(&self) -> &dyn BeaconBlock;
    fn signature(&self) -> &SignatureBytes;

    fn slot(&self) -> Slot {
        self.message().slot()
    }

    fn parent_root(&self) -> H256 {
        self.message().parent_root()
    }

    fn body(&self) -> &dyn BeaconBlockBody {
        self.message().body()
    }
}

#[duplicate_item(
    implementor;
    [Phase0SignedBeaconBlock];
    [CapellaSignedBeaconBlock];
)]
impl SignedBeaconBlock for implementor {
    fn message(&self) -> &dyn BeaconBlock {
        &self.message
    }

    fn signature(&self) -> &SignatureBytes {
        &self.signature
    }
}
