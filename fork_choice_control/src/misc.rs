use std::collections::HashSet;

use derive_more::Display;
use parking_lot::Mutex;
use types::{
    combined::SignedBeaconBlock,
    phase0::primitives::{ExecutionBlockHash, Slot, H256},
    traits::SignedBeaconBlock as _,
};

/// Roots of blocks currently being processed.
#[derive(Default)]
pub struct BeingSynced {
    roots: Mutex<HashSet<H256>>,
}

impl BeingSynced {
    /// Returns `None` if `block_root` is already being processed.
    pub fn try_acquire(&self, block_root: H256) -> Option<SyncGuard<'_>> {
        self.roots.lock().insert(block_root).then_some(SyncGuard {
            being_synced: self,
            block_root,
        })
    }

    #[must_use]
    pub fn contains(&self, block_root: H256) -> bool {
        self.roots.lock().contains(&block_root)
    }
}

pub struct SyncGuard<'set> {
    being_synced: &'set BeingSynced,
    block_root: H256,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.being_synced.roots.lock().remove(&self.block_root);
    }
}

/// Contents of an accepted block, formatted for the log line written after it is committed.
#[derive(Clone, Copy, Debug, Display)]
#[display(
    "slot: {slot}, block_root: {block_root:?}, attestations: {attestations}, \
     deposits: {deposits}, attester_slashings: {attester_slashings}, \
     proposer_slashings: {proposer_slashings}, voluntary_exits: {voluntary_exits}, \
     bls_to_execution_changes: {bls_to_execution_changes}, \
     execution_block_hash: {execution_block_hash:?}, \
     sync_committee_participants: {sync_committee_participants}"
)]
pub struct BlockSummary {
    slot: Slot,
    block_root: H256,
    attestations: usize,
    deposits: usize,
    attester_slashings: usize,
    proposer_slashings: usize,
    voluntary_exits: usize,
    bls_to_execution_changes: usize,
    execution_block_hash: Option<ExecutionBlockHash>,
    sync_committee_participants: usize,
}

impl BlockSummary {
    #[must_use]
    pub fn new(block: &SignedBeaconBlock, block_root: H256) -> Self {
        let body = block.body();
        let post_capella = body.post_capella();

        Self {
            slot: block.slot(),
            block_root,
            attestations: body.attestations().len(),
            deposits: body.deposits().len(),
            attester_slashings: body.attester_slashings().len(),
            proposer_slashings: body.proposer_slashings().len(),
            voluntary_exits: body.voluntary_exits().len(),
            bls_to_execution_changes: post_capella
                .map_or(0, |body| body.bls_to_execution_changes().len()),
            execution_block_hash: post_capella.map(|body| body.execution_payload().block_hash),
            sync_committee_participants: post_capella
                .map_or(0, |body| body.sync_aggregate().sync_committee_bits.count_ones()),
        }
    }
}
