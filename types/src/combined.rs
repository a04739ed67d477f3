use derive_more::From;
use im::Vector;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use variant_count::VariantCount;

use crate::{
    capella::{
        beacon_state::BeaconState as CapellaBeaconState,
        containers::{
            BeaconBlock as CapellaBeaconBlock, SignedBeaconBlock as CapellaSignedBeaconBlock,
        },
    },
    hashing::HashTreeRoot,
    nonstandard::Phase,
    phase0::{
        beacon_state::{BeaconState as Phase0BeaconState, Fork, JustificationBits},
        containers::{
            BeaconBlock as Phase0BeaconBlock, BeaconBlockHeader, Checkpoint, PendingAttestation,
            SignedBeaconBlock as Phase0SignedBeaconBlock, Validator,
        },
        primitives::{DepositIndex, Gwei, SignatureBytes, Slot, UnixSeconds, ValidatorIndex, H256},
    },
    traits::{
        BeaconBlock as _, BeaconBlockBody, BeaconState as _,
        SignedBeaconBlock as SignedBeaconBlockTrait,
    },
};

const_assert_eq!(BeaconState::VARIANT_COUNT, Phase::VARIANT_COUNT);
const_assert_eq!(BeaconBlock::VARIANT_COUNT, Phase::VARIANT_COUNT);
const_assert_eq!(SignedBeaconBlock::VARIANT_COUNT, Phase::VARIANT_COUNT);

macro_rules! dispatch {
    ($value: expr, $inner: ident => $body: expr) => {
        match $value {
            Self::Phase0($inner) => $body,
            Self::Capella($inner) => $body,
        }
    };
}

#[derive(Clone, PartialEq, Eq, Debug, From, VariantCount, Deserialize, Serialize)]
pub enum BeaconState {
    Phase0(Phase0BeaconState),
    Capella(CapellaBeaconState),
}

impl HashTreeRoot for BeaconState {
    fn hash_tree_root(&self) -> H256 {
        dispatch!(self, state => state.hash_tree_root())
    }
}

impl crate::traits::BeaconState for BeaconState {
    fn genesis_time(&self) -> UnixSeconds {
        dispatch!(self, state => state.genesis_time())
    }

    fn genesis_validators_root(&self) -> H256 {
        dispatch!(self, state => state.genesis_validators_root())
    }

    fn slot(&self) -> Slot {
        dispatch!(self, state => state.slot())
    }

    fn slot_mut(&mut self) -> &mut Slot {
        dispatch!(self, state => state.slot_mut())
    }

    fn fork(&self) -> Fork {
        dispatch!(self, state => state.fork())
    }

    fn fork_mut(&mut self) -> &mut Fork {
        dispatch!(self, state => state.fork_mut())
    }

    fn latest_block_header(&self) -> BeaconBlockHeader {
        dispatch!(self, state => state.latest_block_header())
    }

    fn latest_block_header_mut(&mut self) -> &mut BeaconBlockHeader {
        dispatch!(self, state => state.latest_block_header_mut())
    }

    fn block_roots(&self) -> &Vector<H256> {
        dispatch!(self, state => state.block_roots())
    }

    fn block_roots_mut(&mut self) -> &mut Vector<H256> {
        dispatch!(self, state => state.block_roots_mut())
    }

    fn state_roots(&self) -> &Vector<H256> {
        dispatch!(self, state => state.state_roots())
    }

    fn state_roots_mut(&mut self) -> &mut Vector<H256> {
        dispatch!(self, state => state.state_roots_mut())
    }

    fn eth1_deposit_index(&self) -> DepositIndex {
        dispatch!(self, state => state.eth1_deposit_index())
    }

    fn eth1_deposit_index_mut(&mut self) -> &mut DepositIndex {
        dispatch!(self, state => state.eth1_deposit_index_mut())
    }

    fn validators(&self) -> &Vector<Validator> {
        dispatch!(self, state => state.validators())
    }

    fn validators_mut(&mut self) -> &mut Vector<Validator> {
        dispatch!(self, state => state.validators_mut())
    }

    fn balances(&self) -> &Vector<Gwei> {
        dispatch!(self, state => state.balances())
    }

    fn balances_mut(&mut self) -> &mut Vector<Gwei> {
        dispatch!(self, state => state.balances_mut())
    }

    fn previous_epoch_attestations(&self) -> &Vector<PendingAttestation> {
        dispatch!(self, state => state.previous_epoch_attestations())
    }

    fn previous_epoch_attestations_mut(&mut self) -> &mut Vector<PendingAttestation> {
        dispatch!(self, state => state.previous_epoch_attestations_mut())
    }

    fn current_epoch_attestations(&self) -> &Vector<PendingAttestation> {
        dispatch!(self, state => state.current_epoch_attestations())
    }

    fn current_epoch_attestations_mut(&mut self) -> &mut Vector<PendingAttestation> {
        dispatch!(self, state => state.current_epoch_attestations_mut())
    }

    fn justification_bits(&self) -> JustificationBits {
        dispatch!(self, state => state.justification_bits())
    }

    fn justification_bits_mut(&mut self) -> &mut JustificationBits {
        dispatch!(self, state => state.justification_bits_mut())
    }

    fn previous_justified_checkpoint(&self) -> Checkpoint {
        dispatch!(self, state => state.previous_justified_checkpoint())
    }

    fn previous_justified_checkpoint_mut(&mut self) -> &mut Checkpoint {
        dispatch!(self, state => state.previous_justified_checkpoint_mut())
    }

    fn current_justified_checkpoint(&self) -> Checkpoint {
        dispatch!(self, state => state.current_justified_checkpoint())
    }

    fn current_justified_checkpoint_mut(&mut self) -> &mut Checkpoint {
        dispatch!(self, state => state.current_justified_checkpoint_mut())
    }

    fn finalized_checkpoint(&self) -> Checkpoint {
        dispatch!(self, state => state.finalized_checkpoint())
    }

    fn finalized_checkpoint_mut(&mut self) -> &mut Checkpoint {
        dispatch!(self, state => state.finalized_checkpoint_mut())
    }
}

impl BeaconState {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Capella(_) => Phase::Capella,
        }
    }

    #[must_use]
    pub const fn post_capella(&self) -> Option<&CapellaBeaconState> {
        match self {
            Self::Phase0(_) => None,
            Self::Capella(state) => Some(state),
        }
    }

    pub fn post_capella_mut(&mut self) -> Option<&mut CapellaBeaconState> {
        match self {
            Self::Phase0(_) => None,
            Self::Capella(state) => Some(state),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, From, VariantCount, Deserialize, Serialize)]
pub enum BeaconBlock {
    Phase0(Phase0BeaconBlock),
    Capella(CapellaBeaconBlock),
}

impl HashTreeRoot for BeaconBlock {
    fn hash_tree_root(&self) -> H256 {
        dispatch!(self, block => block.hash_tree_root())
    }
}

impl crate::traits::BeaconBlock for BeaconBlock {
    fn slot(&self) -> Slot {
        dispatch!(self, block => block.slot)
    }

    fn proposer_index(&self) -> ValidatorIndex {
        dispatch!(self, block => block.proposer_index)
    }

    fn parent_root(&self) -> H256 {
        dispatch!(self, block => block.parent_root)
    }

    fn state_root(&self) -> H256 {
        dispatch!(self, block => block.state_root)
    }

    fn body(&self) -> &dyn BeaconBlockBody {
        dispatch!(self, block => &block.body)
    }
}

impl BeaconBlock {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Capella(_) => Phase::Capella,
        }
    }

    pub fn set_state_root(&mut self, state_root: H256) {
        dispatch!(self, block => block.state_root = state_root);
    }

    #[must_use]
    pub fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlock {
        match self {
            Self::Phase0(message) => Phase0SignedBeaconBlock { message, signature }.into(),
            Self::Capella(message) => CapellaSignedBeaconBlock { message, signature }.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, From, VariantCount, Deserialize, Serialize)]
pub enum SignedBeaconBlock {
    Phase0(Phase0SignedBeaconBlock),
    Capella(CapellaSignedBeaconBlock),
}

impl SignedBeaconBlockTrait for SignedBeaconBlock {
    fn message(&self) -> &dyn crate::traits::BeaconBlock {
        dispatch!(self, block => &block.message)
    }

    fn signature(&self) -> &SignatureBytes {
        dispatch!(self, block => &block.signature)
    }
}

impl SignedBeaconBlock {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Capella(_) => Phase::Capella,
        }
    }

    #[must_use]
    pub fn split(self) -> (BeaconBlock, SignatureBytes) {
        match self {
            Self::Phase0(block) => (block.message.into(), block.signature),
            Self::Capella(block) => (block.message.into(), block.signature),
        }
    }

    /// Root of the unsigned message.
    #[must_use]
    pub fn root(&self) -> H256 {
        dispatch!(self, block => block.message.hash_tree_root())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        capella::containers::BeaconBlockBody as CapellaBeaconBlockBody,
        phase0::containers::BeaconBlockBody as Phase0BeaconBlockBody,
        traits::{BeaconBlock as _, SignedBeaconBlock as _},
    };

    use super::*;

    #[test]
    fn block_root_matches_root_of_header() {
        let block = BeaconBlock::from(Phase0BeaconBlock {
            slot: 3,
            proposer_index: 1,
            parent_root: H256::repeat_byte(1),
            state_root: H256::repeat_byte(2),
            body: Phase0BeaconBlockBody::default(),
        });

        assert_eq!(block.hash_tree_root(), block.to_header().hash_tree_root());
    }

    #[test]
    fn signature_does_not_affect_block_root() {
        let message = CapellaBeaconBlock {
            slot: 5,
            body: CapellaBeaconBlockBody::default(),
            ..CapellaBeaconBlock::default()
        };

        let block_1 = BeaconBlock::from(message.clone()).with_signature(SignatureBytes::default());
        let block_2 = BeaconBlock::from(message).with_signature(vec![1, 2, 3].into());

        assert_eq!(block_1.root(), block_2.root());
        assert_eq!(block_1.phase(), Phase::Capella);
        assert_eq!(block_1.slot(), 5);
    }

    #[test]
    fn only_capella_bodies_expose_execution_payload() {
        let phase0 = BeaconBlock::from(Phase0BeaconBlock::default());
        let capella = BeaconBlock::from(CapellaBeaconBlock::default());

        assert!(phase0.body().post_capella().is_none());
        assert!(capella.body().post_capella().is_some());
    }

    #[test]
    fn state_accessors_dispatch_to_variant() {
        use crate::traits::BeaconState as _;

        let mut state = BeaconState::from(CapellaBeaconState::default());

        *state.slot_mut() = 17;

        assert_eq!(state.slot(), 17);
        assert_eq!(state.phase(), Phase::Capella);
        assert!(state.post_capella().is_some());
    }
}
