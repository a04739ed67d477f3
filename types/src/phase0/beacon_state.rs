use im::Vector;
use serde::{Deserialize, Serialize};

use crate::{
    hashing::impl_hash_tree_root_by_digest,
    phase0::{
        consts::JUSTIFICATION_BITS_LENGTH,
        containers::{BeaconBlockHeader, Checkpoint, PendingAttestation, Validator},
        primitives::{DepositIndex, Epoch, Gwei, Slot, UnixSeconds, Version, H256},
    },
};

pub type JustificationBits = [bool; JUSTIFICATION_BITS_LENGTH];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Fork {
    pub previous_version: Version,
    pub current_version: Version,
    pub epoch: Epoch,
}

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
}

impl_hash_tree_root_by_digest!(BeaconState);
