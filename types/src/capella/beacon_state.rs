use im::Vector;
use serde::{Deserialize, Serialize};

use crate::{
    capella::containers::ExecutionPayloadHeader,
    hashing::impl_hash_tree_root_by_digest,
    phase0::{
        beacon_state::{Fork, JustificationBits},
        containers::{BeaconBlockHeader, Checkpoint, PendingAttestation, Validator},
        primitives::{DepositIndex, Gwei, Slot, UnixSeconds, H256},
    },
};

#[derive(Clone, PartialEq, Eq, Hash, Default, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BeaconState {
    // > Versioning
    pub genesis_time: UnixSeconds,
    pub genesis_validators_root: H256,
    pub slot: Slot,
    pub fork: Fork,

    // > History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vector<H256>,
    pub state_roots: Vector<H256>,

    // > Eth1
    pub eth1_deposit_index: DepositIndex,

    // > Registry
    pub validators: Vector<Validator>,
    pub balances: Vector<Gwei>,

    // > Attestations
    pub previous_epoch_attestations: Vector<PendingAttestation>,
    pub current_epoch_attestations: Vector<PendingAttestation>,

    // > Finality
    pub justification_bits: JustificationBits,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    // > Execution
    pub latest_execution_payload_header: ExecutionPayloadHeader,
}

impl_hash_tree_root_by_digest!(BeaconState);
