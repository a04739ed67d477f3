use core::marker::PhantomData;
use std::sync::Arc;

use anyhow::{ensure, Result};
use helper_functions::{accessors, misc, predicates::is_active_validator};
use im::{HashMap, HashSet, Vector};
use itertools::Itertools as _;
use log::debug;
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config as ChainConfig,
    hashing::HashTreeRoot as _,
    nonstandard::PayloadStatus,
    phase0::{
        consts::GENESIS_EPOCH,
        containers::{AttestationData, Checkpoint},
        primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{
    error::Error,
    misc::{ApplyBlockChanges, AttestationAction, LatestMessage, Node, ValidAttestation},
    store_config::StoreConfig,
};

/// Weighted block tree used to select the canonical head.
///
/// All collections are persistent, so cloning a [`Store`] to take a snapshot is cheap.
///
/// The head is selected with LMD GHOST starting from the justified block. Among children with
/// equal weight the one with the lexicographically higher root wins.
#[derive(Clone)]
pub struct Store<P: Preset> {
    chain_config: Arc<ChainConfig>,
    store_config: StoreConfig,
    slot: Slot,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    // Root of the oldest block in the store. Its parent is never present.
    anchor_root: H256,
    head_root: H256,
    nodes: HashMap<H256, Node>,
    children: HashMap<H256, Vector<H256>>,
    latest_messages: HashMap<ValidatorIndex, LatestMessage>,
    equivocating_indices: HashSet<ValidatorIndex>,
    // Effective balances of active unslashed validators in the justified state.
    // Validators missing from it have no weight.
    justified_balances: Arc<[Gwei]>,
    phantom: PhantomData<P>,
}

impl<P: Preset> Store<P> {
    /// Creates a store containing only `anchor_block`.
    ///
    /// `anchor_state` must be the post-state of `anchor_block`.
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor_block: Arc<SignedBeaconBlock>,
        anchor_state: &BeaconState,
    ) -> Result<Self> {
        let block_root = anchor_block.root();

        ensure!(
            anchor_block.message().state_root() == anchor_state.hash_tree_root()
                && accessors::latest_block_root(anchor_state) == block_root,
            Error::AnchorBlockMismatch { block_root },
        );

        // The checkpoints in a genesis state have their roots set to zero.
        // The anchor checkpoint refers to the anchor block instead.
        let checkpoint = Checkpoint {
            epoch: accessors::get_current_epoch::<P>(anchor_state),
            root: block_root,
        };

        let anchor = Node {
            block_root,
            block: anchor_block,
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            payload_status: PayloadStatus::Valid,
            weight: 0,
        };

        Ok(Self {
            chain_config,
            store_config,
            slot: anchor_state.slot(),
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            anchor_root: block_root,
            head_root: block_root,
            nodes: HashMap::unit(block_root, anchor),
            children: HashMap::new(),
            latest_messages: HashMap::new(),
            equivocating_indices: HashSet::new(),
            justified_balances: Self::active_balances(anchor_state),
            phantom: PhantomData,
        })
    }

    #[must_use]
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    #[must_use]
    pub const fn store_config(&self) -> StoreConfig {
        self.store_config
    }

    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.slot
    }

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }

    #[must_use]
    pub fn previous_epoch(&self) -> Epoch {
        self.current_epoch().saturating_sub(1)
    }

    #[must_use]
    pub const fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    #[must_use]
    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    #[must_use]
    pub const fn justified_epoch(&self) -> Epoch {
        self.justified_checkpoint.epoch
    }

    #[must_use]
    pub const fn finalized_epoch(&self) -> Epoch {
        self.finalized_checkpoint.epoch
    }

    #[must_use]
    pub const fn anchor_root(&self) -> H256 {
        self.anchor_root
    }

    #[must_use]
    pub fn node(&self, block_root: H256) -> Option<&Node> {
        self.nodes.get(&block_root)
    }

    #[must_use]
    pub fn contains_block(&self, block_root: H256) -> bool {
        self.nodes.contains_key(&block_root)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn block_slot(&self, block_root: H256) -> Option<Slot> {
        self.node(block_root).map(Node::slot)
    }

    #[must_use]
    pub fn is_optimistic(&self, block_root: H256) -> Option<bool> {
        self.node(block_root).map(Node::is_optimistic)
    }

    #[must_use]
    pub fn weight(&self, block_root: H256) -> Option<Gwei> {
        self.node(block_root).map(|node| node.weight)
    }

    #[must_use]
    pub const fn head_root(&self) -> H256 {
        self.head_root
    }

    /// The current canonical head.
    ///
    /// The head is always present in the store because it is recomputed after every mutation.
    #[must_use]
    pub fn head(&self) -> &Node {
        // `Store::update_head` only selects roots of nodes in the store.
        &self.nodes[&self.head_root]
    }

    #[must_use]
    pub fn finalized_slot(&self) -> Slot {
        self.block_slot(self.finalized_checkpoint.root)
            .unwrap_or_else(|| misc::compute_start_slot_at_epoch::<P>(self.finalized_epoch()))
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        self.latest_messages.get(&validator_index).copied()
    }

    #[must_use]
    pub fn is_equivocating(&self, validator_index: ValidatorIndex) -> bool {
        self.equivocating_indices.contains(&validator_index)
    }

    /// Returns the root of the ancestor of `descendant_root` at or before `slot`.
    #[must_use]
    pub fn ancestor(&self, descendant_root: H256, slot: Slot) -> Option<H256> {
        let mut node = self.node(descendant_root)?;

        while node.slot() > slot {
            node = self.node(node.parent_root())?;
        }

        Some(node.block_root)
    }

    #[must_use]
    pub fn is_descendant(&self, descendant_root: H256, ancestor_root: H256) -> bool {
        self.block_slot(ancestor_root)
            .and_then(|slot| self.ancestor(descendant_root, slot))
            .is_some_and(|root| root == ancestor_root)
    }

    /// Blocks from the head back to the anchor, newest first.
    pub fn canonical_chain(&self) -> impl Iterator<Item = &Node> {
        core::iter::successors(self.node(self.head_root), |node| {
            self.node(node.parent_root())
        })
    }

    /// Checks whether a block can be added on top of the existing tree.
    ///
    /// This does not run the state transition. The checks here are the ones that must pass before
    /// the state transition is worth running.
    pub fn validate_block(&self, block: &SignedBeaconBlock) -> Result<()> {
        let block_root = block.root();
        let block_slot = block.slot();
        let parent_root = block.parent_root();

        ensure!(
            !self.contains_block(block_root),
            Error::BlockAlreadyKnown { block_root },
        );

        let Some(parent) = self.node(parent_root) else {
            return Err(Error::NotDescendantOfFinalized {
                block_root,
                parent_root,
            }
            .into());
        };

        ensure!(
            self.is_descendant(parent_root, self.finalized_checkpoint.root),
            Error::NotDescendantOfFinalized {
                block_root,
                parent_root,
            },
        );

        let finalized_slot = self.finalized_slot();

        ensure!(
            block_slot > finalized_slot,
            Error::BlockNotNewerThanFinalized {
                block_slot,
                finalized_slot,
            },
        );

        let parent_slot = parent.slot();

        ensure!(
            block_slot > parent_slot,
            Error::BlockNotNewerThanParent {
                block_slot,
                parent_slot,
            },
        );

        let max_empty_slots = self.store_config.max_empty_slots;

        ensure!(
            block_slot - parent_slot - 1 <= max_empty_slots,
            Error::TooManyEmptySlots {
                block_slot,
                parent_slot,
                max_empty_slots,
            },
        );

        ensure!(
            !parent.is_invalid(),
            Error::ParentPayloadInvalid { parent_root },
        );

        Ok(())
    }

    /// Inserts a block whose post-state is `state`.
    ///
    /// The parent of the block must already be present.
    pub fn apply_block(
        &mut self,
        block: Arc<SignedBeaconBlock>,
        state: &BeaconState,
        payload_status: PayloadStatus,
    ) -> Result<ApplyBlockChanges> {
        self.validate_block(&block)?;

        let block_root = block.root();
        let parent_root = block.parent_root();
        let old_head = self.head().clone();

        let node = Node {
            block_root,
            block,
            justified_checkpoint: state.current_justified_checkpoint(),
            finalized_checkpoint: state.finalized_checkpoint(),
            payload_status,
            weight: 0,
        };

        self.slot = self.slot.max(node.slot());
        self.nodes.insert(block_root, node);
        self.children.entry(parent_root).or_default().push_back(block_root);

        let old_justified_checkpoint = self.justified_checkpoint;
        let old_finalized_checkpoint = self.finalized_checkpoint;

        self.update_checkpoints(
            state.current_justified_checkpoint(),
            state.finalized_checkpoint(),
        );

        let justified_checkpoint_updated = old_justified_checkpoint != self.justified_checkpoint;
        let finalized_checkpoint_updated = old_finalized_checkpoint != self.finalized_checkpoint;

        if justified_checkpoint_updated {
            self.justified_balances = Self::active_balances(state);
            self.recompute_weights();
        }

        self.update_head();

        let changes = if old_head.block_root == self.head_root {
            ApplyBlockChanges::AlternateChainExtended {
                justified_checkpoint_updated,
                finalized_checkpoint_updated,
            }
        } else if self.is_descendant(self.head_root, old_head.block_root) {
            ApplyBlockChanges::CanonicalChainExtended {
                justified_checkpoint_updated,
                finalized_checkpoint_updated,
            }
        } else {
            ApplyBlockChanges::Reorganized {
                justified_checkpoint_updated,
                finalized_checkpoint_updated,
                old_head: Box::new(old_head),
            }
        };

        Ok(changes)
    }

    fn update_checkpoints(
        &mut self,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    ) {
        if justified_checkpoint.epoch > self.justified_checkpoint.epoch {
            self.justified_checkpoint = justified_checkpoint;
        }

        if finalized_checkpoint.epoch > self.finalized_checkpoint.epoch {
            self.finalized_checkpoint = finalized_checkpoint;
        }
    }

    /// Advances the clock of the store. Returns `true` if the slot changed.
    pub fn apply_tick(&mut self, slot: Slot) -> bool {
        if slot <= self.slot {
            return false;
        }

        self.slot = slot;

        true
    }

    /// Decides whether an attestation can be applied to the store now.
    ///
    /// Attestations for unknown blocks and attestations from the current slot are delayed.
    pub fn validate_attestation(&self, data: AttestationData) -> Result<AttestationAction> {
        let target_epoch = data.target.epoch;
        let current_epoch = self.current_epoch();

        ensure!(
            target_epoch <= current_epoch,
            Error::AttestationFromFutureEpoch {
                target_epoch,
                current_epoch,
            },
        );

        ensure!(
            self.previous_epoch() <= target_epoch,
            Error::AttestationTooOld {
                target_epoch,
                current_epoch,
            },
        );

        ensure!(
            target_epoch == misc::compute_epoch_at_slot::<P>(data.slot),
            Error::AttestationTargetsWrongEpoch {
                data: Box::new(data),
            },
        );

        if !self.contains_block(data.target.root) {
            return Ok(AttestationAction::DelayUntilBlock(data.target.root));
        }

        let Some(block_slot) = self.block_slot(data.beacon_block_root) else {
            return Ok(AttestationAction::DelayUntilBlock(data.beacon_block_root));
        };

        ensure!(
            block_slot <= data.slot,
            Error::AttestationForFutureBlock {
                data: Box::new(data),
                block_slot,
            },
        );

        let target_slot = misc::compute_start_slot_at_epoch::<P>(target_epoch);

        ensure!(
            self.ancestor(data.beacon_block_root, target_slot) == Some(data.target.root),
            Error::LmdGhostInconsistentWithFfgTarget {
                data: Box::new(data),
            },
        );

        // > Attestations can only affect the fork choice of subsequent slots.
        if self.slot <= data.slot {
            return Ok(AttestationAction::DelayUntilSlot(data.slot + 1));
        }

        Ok(AttestationAction::Accept)
    }

    /// Applies attestations that were accepted by [`Self::validate_attestation`].
    ///
    /// Returns the old head if the head changed to a block that does not descend from it.
    pub fn apply_attestations(
        &mut self,
        valid_attestations: impl IntoIterator<Item = ValidAttestation>,
    ) -> Option<Node> {
        let mut differences = HashMap::<H256, i128>::new();

        for ValidAttestation {
            data,
            attesting_indices,
        } in valid_attestations
        {
            let new_message = LatestMessage {
                epoch: data.target.epoch,
                beacon_block_root: data.beacon_block_root,
            };

            for validator_index in attesting_indices {
                if self.equivocating_indices.contains(&validator_index) {
                    continue;
                }

                let old_message = self.latest_messages.get(&validator_index).copied();

                if old_message.is_some_and(|message| message.epoch >= new_message.epoch) {
                    continue;
                }

                let balance = i128::from(self.justified_balance(validator_index));

                if let Some(old_message) = old_message {
                    *differences.entry(old_message.beacon_block_root).or_default() -= balance;
                }

                *differences.entry(new_message.beacon_block_root).or_default() += balance;

                self.latest_messages.insert(validator_index, new_message);
            }
        }

        self.apply_differences_and_update_head(differences)
    }

    /// Removes the votes of `slashable_indices` and excludes them from future votes.
    ///
    /// Returns the old head if the head changed to a block that does not descend from it.
    pub fn apply_attester_slashing(
        &mut self,
        slashable_indices: impl IntoIterator<Item = ValidatorIndex>,
    ) -> Option<Node> {
        let mut differences = HashMap::<H256, i128>::new();

        for validator_index in slashable_indices {
            if self.equivocating_indices.insert(validator_index).is_some() {
                continue;
            }

            if let Some(message) = self.latest_messages.get(&validator_index) {
                let balance = i128::from(self.justified_balance(validator_index));
                *differences.entry(message.beacon_block_root).or_default() -= balance;
            }
        }

        self.apply_differences_and_update_head(differences)
    }

    fn apply_differences_and_update_head(
        &mut self,
        differences: HashMap<H256, i128>,
    ) -> Option<Node> {
        let old_head = self.head().clone();

        for (block_root, difference) in differences {
            self.apply_difference(block_root, difference);
        }

        self.update_head();

        self.is_reorganization(old_head.block_root)
            .then_some(old_head)
    }

    // Adds `difference` to the weight of `block_root` and all of its ancestors.
    fn apply_difference(&mut self, block_root: H256, difference: i128) {
        if difference == 0 {
            return;
        }

        let mut current = Some(block_root);

        while let Some(root) = current {
            let Some(node) = self.nodes.get_mut(&root) else {
                break;
            };

            node.weight = Gwei::try_from((i128::from(node.weight) + difference).max(0))
                .unwrap_or(Gwei::MAX);

            current = Some(node.parent_root());
        }
    }

    fn recompute_weights(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            node.weight = 0;
        }

        let votes = self
            .latest_messages
            .iter()
            .filter(|(validator_index, _)| !self.equivocating_indices.contains(validator_index))
            .map(|(validator_index, message)| {
                let balance = i128::from(self.justified_balance(*validator_index));
                (message.beacon_block_root, balance)
            })
            .collect_vec();

        for (block_root, balance) in votes {
            self.apply_difference(block_root, balance);
        }
    }

    /// Marks the payload of `block_root` and all of its ancestors as valid.
    pub fn mark_valid(&mut self, block_root: H256) -> Result<()> {
        ensure!(
            self.contains_block(block_root),
            Error::UnknownBlock { block_root },
        );

        let mut current = Some(block_root);

        while let Some(root) = current {
            let Some(node) = self.nodes.get_mut(&root) else {
                break;
            };

            if node.payload_status.is_valid() {
                break;
            }

            node.payload_status = PayloadStatus::Valid;
            current = Some(node.parent_root());
        }

        Ok(())
    }

    /// Marks the payload of `block_root` and all of its descendants as invalid.
    ///
    /// Returns the old head if the head changed as a result.
    pub fn mark_invalid(&mut self, block_root: H256) -> Result<Option<Node>> {
        ensure!(
            self.contains_block(block_root),
            Error::UnknownBlock { block_root },
        );

        let old_head = self.head().clone();
        let mut pending = vec![block_root];

        while let Some(root) = pending.pop() {
            if let Some(node) = self.nodes.get_mut(&root) {
                node.payload_status = PayloadStatus::Invalid;
            }

            if let Some(children) = self.children.get(&root) {
                pending.extend(children.iter().copied());
            }
        }

        self.update_head();

        Ok((old_head.block_root != self.head_root).then_some(old_head))
    }

    /// Removes blocks that do not descend from the finalized block.
    ///
    /// Returns the roots of the removed blocks.
    pub fn prune_finalized(&mut self) -> Vec<H256> {
        let finalized_root = self.finalized_checkpoint.root;

        if finalized_root == self.anchor_root || !self.contains_block(finalized_root) {
            return vec![];
        }

        let pruned = self
            .nodes
            .keys()
            .copied()
            .filter(|root| !self.is_descendant(*root, finalized_root))
            .collect_vec();

        for root in &pruned {
            self.nodes.remove(root);
            self.children.remove(root);
        }

        self.anchor_root = finalized_root;

        self.latest_messages
            .retain(|_, message| self.nodes.contains_key(&message.beacon_block_root));

        self.update_head();

        debug!(
            "pruned {} blocks not descending from finalized block {finalized_root:?}",
            pruned.len(),
        );

        pruned
    }

    fn update_head(&mut self) {
        let viable = self.viable_roots();
        let mut head = self.justified_root();

        loop {
            let best_child = self
                .children
                .get(&head)
                .into_iter()
                .flatten()
                .filter(|root| viable.contains(*root))
                .filter_map(|root| self.node(*root))
                .max_by_key(|node| (node.weight, node.block_root));

            match best_child {
                Some(child) => head = child.block_root,
                None => break,
            }
        }

        self.head_root = head;
    }

    fn justified_root(&self) -> H256 {
        let root = self.justified_checkpoint.root;

        if self.contains_block(root) {
            root
        } else {
            self.anchor_root
        }
    }

    // Roots of blocks that are not invalid and lead to a leaf whose checkpoints agree with
    // the store.
    fn viable_roots(&self) -> HashSet<H256> {
        let mut viable = HashSet::new();

        let newest_first = self
            .nodes
            .values()
            .sorted_by_key(|node| core::cmp::Reverse(node.slot()));

        for node in newest_first {
            if node.is_invalid() {
                continue;
            }

            let is_viable = match self.children.get(&node.block_root) {
                Some(children) if !children.is_empty() => {
                    children.iter().any(|child| viable.contains(child))
                }
                _ => self.is_leaf_viable(node),
            };

            if is_viable {
                viable.insert(node.block_root);
            }
        }

        viable
    }

    fn is_leaf_viable(&self, node: &Node) -> bool {
        let correct_justified = self.justified_epoch() == GENESIS_EPOCH
            || node.justified_checkpoint.epoch == self.justified_epoch();

        let correct_finalized = self.finalized_epoch() == GENESIS_EPOCH
            || node.finalized_checkpoint.epoch == self.finalized_epoch();

        correct_justified && correct_finalized
    }

    fn justified_balance(&self, validator_index: ValidatorIndex) -> Gwei {
        usize::try_from(validator_index)
            .ok()
            .and_then(|index| self.justified_balances.get(index))
            .copied()
            .unwrap_or_default()
    }

    fn active_balances(state: &BeaconState) -> Arc<[Gwei]> {
        let epoch = accessors::get_current_epoch::<P>(state);

        state
            .validators()
            .iter()
            .map(|validator| {
                if is_active_validator(validator, epoch) && !validator.slashed {
                    validator.effective_balance
                } else {
                    0
                }
            })
            .collect()
    }

    /// Checks the relationship between heads before and after a change.
    #[must_use]
    pub fn is_reorganization(&self, old_head_root: H256) -> bool {
        old_head_root != self.head_root && !self.is_descendant(self.head_root, old_head_root)
    }

    #[must_use]
    pub fn head_slot(&self) -> Slot {
        self.head().slot()
    }
}

#[cfg(test)]
mod tests {
    use std_ext::ArcExt as _;
    use test_case::test_case;
    use types::{combined::BeaconBlock, preset::Minimal};

    use super::*;

    struct Fixture {
        config: Arc<ChainConfig>,
        genesis_state: Arc<BeaconState>,
        genesis_root: H256,
        store: Store<Minimal>,
    }

    fn fixture() -> Result<Fixture> {
        let config = Arc::new(ChainConfig::minimal());
        let genesis_state = factory::min_genesis_state::<Minimal>(&config)?;
        let genesis_block = factory::genesis_block(&genesis_state);
        let genesis_root = genesis_block.root();

        let store = Store::new(
            config.clone_arc(),
            StoreConfig::default(),
            genesis_block,
            &genesis_state,
        )?;

        Ok(Fixture {
            config,
            genesis_state,
            genesis_root,
            store,
        })
    }

    fn insert(
        store: &mut Store<Minimal>,
        config: &ChainConfig,
        pre_state: Arc<BeaconState>,
        slot: Slot,
        graffiti: u8,
    ) -> Result<(H256, Arc<BeaconState>)> {
        let (block, state) =
            factory::empty_block::<Minimal>(config, pre_state, slot, H256::repeat_byte(graffiti))?;
        let root = block.root();
        store.apply_block(block, &state, PayloadStatus::Valid)?;
        Ok((root, state))
    }

    fn vote(store: &Store<Minimal>, root: H256, slot: Slot, indices: Vec<u64>) -> ValidAttestation {
        let epoch = misc::compute_epoch_at_slot::<Minimal>(slot);
        let target_root = store
            .ancestor(root, misc::compute_start_slot_at_epoch::<Minimal>(epoch))
            .unwrap_or(root);

        ValidAttestation {
            data: AttestationData {
                slot,
                index: 0,
                beacon_block_root: root,
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch,
                    root: target_root,
                },
            },
            attesting_indices: indices,
        }
    }

    #[test]
    fn anchor_is_head_of_new_store() -> Result<()> {
        let Fixture {
            genesis_root,
            store,
            ..
        } = fixture()?;

        assert_eq!(store.head_root(), genesis_root);
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.justified_checkpoint().root, genesis_root);
        assert_eq!(store.finalized_checkpoint().root, genesis_root);

        Ok(())
    }

    #[test]
    fn anchor_must_match_state() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            ..
        } = fixture()?;

        let (block, _) =
            factory::empty_block::<Minimal>(&config, genesis_state.clone_arc(), 1, H256::zero())?;

        let result = Store::<Minimal>::new(config, StoreConfig::default(), block, &genesis_state);

        assert!(result.is_err());

        Ok(())
    }

    #[test]
    fn child_of_anchor_becomes_head() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            genesis_root,
            mut store,
        } = fixture()?;

        let (child_root, _) = insert(&mut store, &config, genesis_state, 1, 0)?;

        assert!(store.contains_block(child_root));
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.head_root(), child_root);
        assert_eq!(store.head().parent_root(), genesis_root);
        assert_eq!(store.block_slot(child_root), Some(1));

        Ok(())
    }

    #[test]
    fn block_with_unknown_parent_is_not_descendant_of_finalized() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            mut store,
            ..
        } = fixture()?;

        insert(&mut store, &config, genesis_state.clone_arc(), 1, 0)?;

        let (block, state) =
            factory::empty_block::<Minimal>(&config, genesis_state, 2, H256::zero())?;

        let (mut message, signature) = block.as_ref().clone().split();

        match &mut message {
            BeaconBlock::Phase0(block) => block.parent_root = H256::repeat_byte(0xff),
            BeaconBlock::Capella(block) => block.parent_root = H256::repeat_byte(0xff),
        }

        let orphan = Arc::new(message.with_signature(signature));
        let result = store.apply_block(orphan, &state, PayloadStatus::Valid);

        assert!(matches!(
            result.map_err(|error| error.downcast::<Error>()),
            Err(Ok(Error::NotDescendantOfFinalized { .. })),
        ));
        assert_eq!(store.node_count(), 2);

        Ok(())
    }

    #[test]
    fn duplicate_block_is_rejected() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            mut store,
            ..
        } = fixture()?;

        let (block, state) =
            factory::empty_block::<Minimal>(&config, genesis_state, 1, H256::zero())?;

        store.apply_block(block.clone_arc(), &state, PayloadStatus::Valid)?;

        assert!(store.apply_block(block, &state, PayloadStatus::Valid).is_err());
        assert_eq!(store.node_count(), 2);

        Ok(())
    }

    #[test_case(32, true)]
    #[test_case(33, false)]
    fn empty_slot_limit_is_enforced(skipped: u64, accepted: bool) -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            mut store,
            ..
        } = fixture()?;

        let result = insert(&mut store, &config, genesis_state, skipped + 1, 0);

        assert_eq!(result.is_ok(), accepted);

        Ok(())
    }

    #[test]
    fn equal_weight_tie_is_broken_by_higher_root() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            mut store,
            ..
        } = fixture()?;

        let (root_a, _) = insert(&mut store, &config, genesis_state.clone_arc(), 1, 1)?;
        let (root_b, _) = insert(&mut store, &config, genesis_state, 1, 2)?;

        assert_eq!(store.head_root(), root_a.max(root_b));

        Ok(())
    }

    #[test]
    fn heavier_branch_wins_and_reorganizes() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            mut store,
            ..
        } = fixture()?;

        let (root_a, _) = insert(&mut store, &config, genesis_state.clone_arc(), 1, 1)?;
        let (root_b, _) = insert(&mut store, &config, genesis_state, 1, 2)?;

        let (winner, loser) = if root_a > root_b {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };

        assert_eq!(store.head_root(), winner);

        store.apply_tick(2);

        let old_head = store.apply_attestations([vote(&store, loser, 1, vec![0, 1, 2])]);

        assert_eq!(store.head_root(), loser);
        assert_eq!(old_head.map(|node| node.block_root), Some(winner));
        assert_eq!(store.weight(loser), Some(3 * Minimal::MAX_EFFECTIVE_BALANCE));
        assert_eq!(store.weight(winner), Some(0));

        Ok(())
    }

    #[test]
    fn newer_vote_moves_weight() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            genesis_root,
            mut store,
        } = fixture()?;

        let (root_1, state_1) = insert(&mut store, &config, genesis_state, 1, 0)?;
        let (root_9, _) = insert(&mut store, &config, state_1, 9, 0)?;

        store.apply_tick(10);
        store.apply_attestations([vote(&store, root_1, 1, vec![7])]);

        assert_eq!(store.weight(root_1), Some(Minimal::MAX_EFFECTIVE_BALANCE));
        assert_eq!(store.weight(root_9), Some(0));

        store.apply_attestations([vote(&store, root_9, 9, vec![7])]);

        assert_eq!(store.weight(root_1), Some(Minimal::MAX_EFFECTIVE_BALANCE));
        assert_eq!(store.weight(root_9), Some(Minimal::MAX_EFFECTIVE_BALANCE));
        assert_eq!(store.weight(genesis_root), Some(Minimal::MAX_EFFECTIVE_BALANCE));

        // An older vote does not replace a newer one.
        store.apply_attestations([vote(&store, root_1, 1, vec![7])]);

        assert_eq!(store.weight(root_9), Some(Minimal::MAX_EFFECTIVE_BALANCE));

        Ok(())
    }

    #[test]
    fn attester_slashing_removes_votes() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            mut store,
            ..
        } = fixture()?;

        let (root, _) = insert(&mut store, &config, genesis_state, 1, 0)?;

        store.apply_tick(2);
        store.apply_attestations([vote(&store, root, 1, vec![3, 4])]);

        assert_eq!(store.weight(root), Some(2 * Minimal::MAX_EFFECTIVE_BALANCE));

        store.apply_attester_slashing([3]);

        assert_eq!(store.weight(root), Some(Minimal::MAX_EFFECTIVE_BALANCE));
        assert!(store.is_equivocating(3));

        // Votes from equivocating validators are ignored.
        store.apply_attestations([vote(&store, root, 1, vec![3])]);

        assert_eq!(store.weight(root), Some(Minimal::MAX_EFFECTIVE_BALANCE));
        assert_eq!(store.head_root(), root);

        Ok(())
    }

    #[test]
    fn attestations_are_delayed_until_next_slot_and_known_block() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            mut store,
            ..
        } = fixture()?;

        let (root, _) = insert(&mut store, &config, genesis_state, 1, 0)?;
        let data = vote(&store, root, 1, vec![0]).data;

        assert_eq!(
            store.validate_attestation(data)?,
            AttestationAction::DelayUntilSlot(2),
        );

        store.apply_tick(2);

        assert_eq!(store.validate_attestation(data)?, AttestationAction::Accept);

        let unknown = AttestationData {
            beacon_block_root: H256::repeat_byte(0xaa),
            ..data
        };

        assert_eq!(
            store.validate_attestation(unknown)?,
            AttestationAction::DelayUntilBlock(H256::repeat_byte(0xaa)),
        );

        let inconsistent = AttestationData {
            target: Checkpoint { epoch: 0, root },
            beacon_block_root: store.anchor_root(),
            ..data
        };

        assert!(store.validate_attestation(inconsistent).is_err());

        Ok(())
    }

    #[test]
    fn invalid_payload_excludes_branch_from_head() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            genesis_root,
            mut store,
        } = fixture()?;

        let (block, state) = factory::empty_block::<Minimal>(
            &config,
            genesis_state.clone_arc(),
            1,
            H256::zero(),
        )?;
        let root_1 = block.root();
        store.apply_block(block, &state, PayloadStatus::Optimistic)?;

        let (block, state) = factory::empty_block::<Minimal>(&config, state, 2, H256::zero())?;
        let root_2 = block.root();
        store.apply_block(block, &state, PayloadStatus::Optimistic)?;

        assert_eq!(store.is_optimistic(root_2), Some(true));

        let old_head = store.mark_invalid(root_1)?;

        assert_eq!(old_head.map(|node| node.block_root), Some(root_2));
        assert_eq!(store.head_root(), genesis_root);
        assert!(store.node(root_2).is_some_and(Node::is_invalid));

        let (block, state) =
            factory::empty_block::<Minimal>(&config, state, 3, H256::zero())?;

        assert!(matches!(
            store
                .apply_block(block, &state, PayloadStatus::Valid)
                .map_err(|error| error.downcast::<Error>()),
            Err(Ok(Error::ParentPayloadInvalid { .. })),
        ));

        Ok(())
    }

    #[test]
    fn mark_valid_updates_ancestors() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            mut store,
            ..
        } = fixture()?;

        let (block_1, state_1) =
            factory::empty_block::<Minimal>(&config, genesis_state, 1, H256::zero())?;
        let (block_2, state_2) =
            factory::empty_block::<Minimal>(&config, state_1.clone_arc(), 2, H256::zero())?;

        let root_1 = block_1.root();
        let root_2 = block_2.root();

        store.apply_block(block_1, &state_1, PayloadStatus::Optimistic)?;
        store.apply_block(block_2, &state_2, PayloadStatus::Optimistic)?;
        store.mark_valid(root_2)?;

        assert_eq!(store.is_optimistic(root_1), Some(false));
        assert_eq!(store.is_optimistic(root_2), Some(false));
        assert!(store.mark_valid(H256::repeat_byte(1)).is_err());

        Ok(())
    }

    #[test]
    fn finalization_updates_checkpoints_and_prunes_forks() -> Result<()> {
        let Fixture {
            config,
            genesis_state,
            genesis_root,
            mut store,
        } = fixture()?;

        let (fork_root, _) = insert(&mut store, &config, genesis_state.clone_arc(), 1, 0xee)?;

        let mut state = genesis_state;
        let mut finalized_epochs = vec![];

        for slot in 1..=32 {
            let (block, post_state) = factory::full_block::<Minimal>(&config, state, slot)?;
            store.apply_block(block, &post_state, PayloadStatus::Valid)?;
            finalized_epochs.push(store.finalized_epoch());
            state = post_state;
        }

        assert!(finalized_epochs.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(store.justified_epoch(), 3);
        assert_eq!(store.finalized_epoch(), 2);
        assert_eq!(store.head_slot(), 32);
        assert!(store.contains_block(fork_root));

        let pruned = store.prune_finalized();

        assert!(pruned.contains(&fork_root));
        assert!(pruned.contains(&genesis_root));
        assert!(!store.contains_block(fork_root));
        assert_eq!(store.anchor_root(), store.finalized_checkpoint().root);
        assert_eq!(store.node_count(), 32 - 16 + 1);

        Ok(())
    }
}
