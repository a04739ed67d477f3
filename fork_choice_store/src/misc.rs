use std::sync::Arc;

use types::{
    combined::SignedBeaconBlock,
    nonstandard::PayloadStatus,
    phase0::{
        containers::{AttestationData, Checkpoint},
        primitives::{Epoch, ExecutionBlockHash, Gwei, Slot, ValidatorIndex, H256},
    },
    traits::SignedBeaconBlock as _,
};

/// A block in the fork choice tree.
#[derive(Clone, Debug)]
pub struct Node {
    pub block_root: H256,
    pub block: Arc<SignedBeaconBlock>,
    /// Checkpoints from the post-state of `block`.
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub payload_status: PayloadStatus,
    /// Total balance of latest messages for this block and its descendants.
    pub weight: Gwei,
}

impl Node {
    #[must_use]
    pub fn slot(&self) -> Slot {
        self.block.slot()
    }

    #[must_use]
    pub fn parent_root(&self) -> H256 {
        self.block.parent_root()
    }

    #[must_use]
    pub fn execution_block_hash(&self) -> Option<ExecutionBlockHash> {
        self.block
            .body()
            .post_capella()
            .map(|body| body.execution_payload().block_hash)
    }

    #[must_use]
    pub const fn is_optimistic(&self) -> bool {
        self.payload_status.is_optimistic()
    }

    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        self.payload_status.is_invalid()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LatestMessage {
    pub epoch: Epoch,
    pub beacon_block_root: H256,
}

/// Attestation that passed [`Store::validate_attestation`] with its attesting indices resolved.
///
/// [`Store::validate_attestation`]: crate::Store::validate_attestation
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ValidAttestation {
    pub data: AttestationData,
    pub attesting_indices: Vec<ValidatorIndex>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttestationAction {
    Accept,
    /// The attestation votes for a block that is not in the store yet.
    DelayUntilBlock(H256),
    /// The attestation cannot affect fork choice until the given slot.
    DelayUntilSlot(Slot),
}

impl AttestationAction {
    #[must_use]
    pub const fn is_delayed(self) -> bool {
        !matches!(self, Self::Accept)
    }
}

#[derive(Clone, Debug)]
pub enum ApplyBlockChanges {
    CanonicalChainExtended {
        justified_checkpoint_updated: bool,
        finalized_checkpoint_updated: bool,
    },
    Reorganized {
        justified_checkpoint_updated: bool,
        finalized_checkpoint_updated: bool,
        old_head: Box<Node>,
    },
    AlternateChainExtended {
        justified_checkpoint_updated: bool,
        finalized_checkpoint_updated: bool,
    },
}

impl ApplyBlockChanges {
    #[must_use]
    pub const fn is_justified_checkpoint_updated(&self) -> bool {
        match *self {
            Self::CanonicalChainExtended {
                justified_checkpoint_updated,
                ..
            }
            | Self::Reorganized {
                justified_checkpoint_updated,
                ..
            }
            | Self::AlternateChainExtended {
                justified_checkpoint_updated,
                ..
            } => justified_checkpoint_updated,
        }
    }

    #[must_use]
    pub const fn is_finalized_checkpoint_updated(&self) -> bool {
        match *self {
            Self::CanonicalChainExtended {
                finalized_checkpoint_updated,
                ..
            }
            | Self::Reorganized {
                finalized_checkpoint_updated,
                ..
            }
            | Self::AlternateChainExtended {
                finalized_checkpoint_updated,
                ..
            } => finalized_checkpoint_updated,
        }
    }

    #[must_use]
    pub const fn is_canonical(&self) -> bool {
        !matches!(self, Self::AlternateChainExtended { .. })
    }
}
