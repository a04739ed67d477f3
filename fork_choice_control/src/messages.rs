use log::debug;
use types::phase0::{
    containers::{IndexedAttestation, ProposerSlashing},
    primitives::H256,
};

use crate::unbounded_sink::UnboundedSink;

/// Objects forwarded to slashing detection.
#[derive(Debug)]
pub enum SlasherMessage {
    /// Attestations included in an accepted block.
    Attestations {
        block_root: H256,
        attestations: Vec<IndexedAttestation>,
    },
    ProposerSlashing(Box<ProposerSlashing>),
}

impl SlasherMessage {
    pub fn send(self, tx: &impl UnboundedSink<Self>) {
        if tx.unbounded_send(self).is_err() {
            debug!("send to slasher failed because the receiver was dropped");
        }
    }
}
