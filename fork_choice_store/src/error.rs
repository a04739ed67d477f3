use thiserror::Error;
use types::phase0::{
    containers::AttestationData,
    primitives::{Epoch, Slot, H256},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("anchor block does not match anchor state (block_root: {block_root:?})")]
    AnchorBlockMismatch { block_root: H256 },
    #[error(
        "attestation votes for a block from the future \
         (data: {data:?}, block_slot: {block_slot})"
    )]
    AttestationForFutureBlock {
        data: Box<AttestationData>,
        block_slot: Slot,
    },
    #[error(
        "attestation is too old \
         (target_epoch: {target_epoch}, current_epoch: {current_epoch})"
    )]
    AttestationTooOld {
        target_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error(
        "attestation targets an epoch in the future \
         (target_epoch: {target_epoch}, current_epoch: {current_epoch})"
    )]
    AttestationFromFutureEpoch {
        target_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error("attestation votes for a checkpoint in the wrong epoch: {data:?}")]
    AttestationTargetsWrongEpoch { data: Box<AttestationData> },
    #[error("block is already present in the fork choice store: {block_root:?}")]
    BlockAlreadyKnown { block_root: H256 },
    #[error(
        "block is not newer than its parent \
         (block_slot: {block_slot}, parent_slot: {parent_slot})"
    )]
    BlockNotNewerThanParent { block_slot: Slot, parent_slot: Slot },
    #[error(
        "block is not newer than the finalized block \
         (block_slot: {block_slot}, finalized_slot: {finalized_slot})"
    )]
    BlockNotNewerThanFinalized {
        block_slot: Slot,
        finalized_slot: Slot,
    },
    #[error("LMD GHOST vote is inconsistent with FFG vote target: {data:?}")]
    LmdGhostInconsistentWithFfgTarget { data: Box<AttestationData> },
    #[error(
        "block is not a descendant of the finalized block \
         (block_root: {block_root:?}, parent_root: {parent_root:?})"
    )]
    NotDescendantOfFinalized { block_root: H256, parent_root: H256 },
    #[error("parent of block has an invalid execution payload: {parent_root:?}")]
    ParentPayloadInvalid { parent_root: H256 },
    #[error(
        "block skips too many slots \
         (block_slot: {block_slot}, parent_slot: {parent_slot}, max_empty_slots: {max_empty_slots})"
    )]
    TooManyEmptySlots {
        block_slot: Slot,
        parent_slot: Slot,
        max_empty_slots: u64,
    },
    #[error("block is not present in the fork choice store: {block_root:?}")]
    UnknownBlock { block_root: H256 },
}
