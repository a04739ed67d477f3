// The `Controller` is the only entry point into fork choice for the rest of the node.
//
// Blocks are validated and transitioned against a snapshot of the store without holding the store
// lock. The lock is only taken to commit the results. Blocks with the same root are never processed
// concurrently.

use core::sync::atomic::{AtomicBool, Ordering};
use std::{collections::HashSet, sync::Arc, time::Instant};

use anyhow::{bail, ensure, Context as _, Result};
use execution_engine::{ExecutionEngine, ForkChoiceStateV1};
use features::Feature;
use fork_choice_store::{AttestationAction, Node, Store, ValidAttestation};
use futures::channel::{mpsc::UnboundedSender, oneshot};
use helper_functions::accessors;
use itertools::Itertools as _;
use log::{debug, error, info, warn};
use operation_pools::{AttestationPool, OperationPools, PoolAdditionOutcome};
use parking_lot::Mutex;
use prometheus_metrics::Metrics;
use state_cache::StateCache;
use std_ext::ArcExt as _;
use tokio::task::JoinHandle;
use types::{
    capella::containers::SignedBlsToExecutionChange,
    combined::{BeaconState, SignedBeaconBlock},
    config::Config as ChainConfig,
    nonstandard::PayloadStatus,
    phase0::{
        containers::{
            Attestation, AttesterSlashing, Checkpoint, ProposerSlashing, SignedVoluntaryExit,
        },
        primitives::{Epoch, ExecutionBlockHash, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{
    block_processor::BlockProcessor,
    controller_config::ControllerConfig,
    error::ReceiveBlockError,
    events::EventChannels,
    head::{Head, HeadHandle},
    messages::SlasherMessage,
    misc::{BeingSynced, BlockSummary},
    state_generator::StateGenerator,
    storage::Storage,
    store_lock::StoreLock,
    tasks::{self, DepositFinalizer, NullDepositFinalizer},
    weak_subjectivity::WeakSubjectivityVerifier,
};

/// Receives blocks, attestations and other operations and keeps the canonical head up to date.
///
/// All mutations of the fork choice store go through [`StoreLock`]. Queries read the last
/// published snapshot of the store or the [`HeadHandle`] and never wait for commits.
///
/// After a fatal error (a finalized chain that conflicts with the weak subjectivity checkpoint)
/// the controller halts and rejects everything it receives.
pub struct Controller<P: Preset, E, S> {
    pub(crate) chain_config: Arc<ChainConfig>,
    pub(crate) controller_config: ControllerConfig,
    pub(crate) store_lock: StoreLock<P>,
    pub(crate) head: HeadHandle,
    pub(crate) block_processor: Arc<BlockProcessor<P>>,
    pub(crate) state_generator: Arc<StateGenerator<P, S>>,
    pub(crate) execution_engine: E,
    pub(crate) storage: Arc<S>,
    pub(crate) attestation_pool: Arc<AttestationPool>,
    pub(crate) operation_pools: Arc<OperationPools>,
    pub(crate) event_channels: Arc<EventChannels>,
    pub(crate) deposit_finalizer: Arc<dyn DepositFinalizer>,
    pub(crate) slasher_tx: Option<UnboundedSender<SlasherMessage>>,
    pub(crate) weak_subjectivity_verifier: WeakSubjectivityVerifier,
    pub(crate) being_synced: BeingSynced,
    pub(crate) halted: AtomicBool,
    pub(crate) pending_tasks: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) metrics: Option<Arc<Metrics>>,
}

impl<P: Preset, E: ExecutionEngine, S: Storage> Controller<P, E, S> {
    /// Starts fork choice from `anchor_block` and its post-state.
    ///
    /// The anchor is written to `storage` so that states can always be regenerated from it.
    pub fn new(
        chain_config: Arc<ChainConfig>,
        controller_config: ControllerConfig,
        anchor_block: Arc<SignedBeaconBlock>,
        anchor_state: Arc<BeaconState>,
        execution_engine: E,
        storage: Arc<S>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let anchor_root = anchor_block.root();

        let store = Store::new(
            chain_config.clone_arc(),
            controller_config.store_config,
            anchor_block.clone_arc(),
            &anchor_state,
        )?;

        storage.save_block(&anchor_block)?;
        storage.save_state(anchor_root, &anchor_state)?;
        storage.save_justified_checkpoint(store.justified_checkpoint())?;
        storage.save_finalized_checkpoint(store.finalized_checkpoint())?;

        let block_processor = Arc::new(BlockProcessor::new(
            chain_config.clone_arc(),
            metrics.clone(),
        ));

        let state_cache = StateCache::new(controller_config.state_cache_lock_timeout);
        state_cache.insert(anchor_root, anchor_state.clone_arc())?;

        let state_generator = Arc::new(StateGenerator::new(
            chain_config.clone_arc(),
            state_cache,
            storage.clone_arc(),
            block_processor.clone_arc(),
        ));

        let head = HeadHandle::new(Head {
            block_root: anchor_root,
            block: anchor_block,
            state: anchor_state,
            is_optimistic: false,
        });

        info!(
            "fork choice started from anchor (slot: {}, root: {anchor_root:?})",
            head.slot(),
        );

        Ok(Self {
            chain_config,
            event_channels: Arc::new(EventChannels::new(controller_config.max_events)),
            controller_config,
            store_lock: StoreLock::new(store),
            head,
            block_processor,
            state_generator,
            execution_engine,
            storage,
            attestation_pool: Arc::default(),
            operation_pools: Arc::default(),
            deposit_finalizer: Arc::new(NullDepositFinalizer),
            slasher_tx: None,
            weak_subjectivity_verifier: WeakSubjectivityVerifier::default(),
            being_synced: BeingSynced::default(),
            halted: AtomicBool::new(false),
            pending_tasks: Mutex::default(),
            metrics,
        })
    }

    #[must_use]
    pub fn with_deposit_finalizer(mut self, deposit_finalizer: Arc<dyn DepositFinalizer>) -> Self {
        self.deposit_finalizer = deposit_finalizer;
        self
    }

    #[must_use]
    pub fn with_slasher_tx(mut self, slasher_tx: UnboundedSender<SlasherMessage>) -> Self {
        self.slasher_tx = Some(slasher_tx);
        self
    }

    #[must_use]
    pub fn with_weak_subjectivity_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.weak_subjectivity_verifier = WeakSubjectivityVerifier::new(Some(checkpoint));
        self
    }

    #[must_use]
    pub fn with_event_channels(mut self, event_channels: Arc<EventChannels>) -> Self {
        self.event_channels = event_channels;
        self
    }

    #[must_use]
    pub fn with_pools(
        mut self,
        attestation_pool: Arc<AttestationPool>,
        operation_pools: Arc<OperationPools>,
    ) -> Self {
        self.attestation_pool = attestation_pool;
        self.operation_pools = operation_pools;
        self
    }

    /// Validates `block`, runs the state transition and commits the block to fork choice.
    ///
    /// Blocks that are already in fork choice or are being processed by another call are
    /// ignored. The state transition and the execution payload check run concurrently.
    /// The first of them to fail decides the error.
    pub async fn receive_block(&self, block: Arc<SignedBeaconBlock>) -> Result<()> {
        self.ensure_not_halted()?;

        let started_at = Instant::now();
        let block_root = block.root();

        if self.store_lock.snapshot().contains_block(block_root) {
            debug!("ignoring block that is already known: {block_root:?}");
            return Ok(());
        }

        let Some(_sync_guard) = self.being_synced.try_acquire(block_root) else {
            debug!("ignoring block that is already being processed: {block_root:?}");
            return Ok(());
        };

        let _timer = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.block_processing_times.start_timer());

        // Callers may keep using their copy of the block.
        let block = Arc::new(SignedBeaconBlock::clone(&block));
        let parent_root = block.parent_root();
        let snapshot = self.store_lock.owned_snapshot();

        if snapshot.contains_block(block_root) {
            return Ok(());
        }

        ensure!(
            snapshot.contains_block(parent_root),
            ReceiveBlockError::NotDescendantOfFinalized { block_root },
        );

        let pre_state = self
            .state_generator
            .state_before_or_at_slot(parent_root, block.slot())
            .with_context(|| ReceiveBlockError::PreStateUnavailable { parent_root })?;

        let justified_epoch = snapshot.justified_epoch();
        let finalized_epoch = snapshot.finalized_epoch();

        let (post_state, payload_status) = futures::try_join!(
            self.validate_in_background(snapshot, pre_state, block.clone_arc(), block_root),
            self.check_payload(&block, block_root),
        )?;

        let Some(newly_finalized) = self.commit_block(
            &block,
            block_root,
            &post_state,
            payload_status,
            justified_epoch,
            finalized_epoch,
        )?
        else {
            return Ok(());
        };

        if let Some(finalized_checkpoint) = newly_finalized {
            self.on_finalized(finalized_checkpoint);
        }

        self.forward_to_slasher(&block, block_root, &post_state);

        if self.head.block_root() == block_root {
            let removed = self.operation_pools.mark_included(block.body());
            debug!("removed {removed} operations included in head block {block_root:?}");
        }

        self.update_hot_state_saving();
        self.track_collection_metrics();

        info!("block accepted ({})", BlockSummary::new(&block, block_root));

        features::log!(
            LogBlockProcessingTime,
            "block {block_root:?} processed in {:?}",
            started_at.elapsed(),
        );

        Ok(())
    }

    /// Receives a linked chain of blocks from initial sync.
    ///
    /// State transitions run outside the store lock. All blocks are then committed under a single
    /// acquisition of the lock and written to storage in one batch.
    pub async fn receive_block_batch(&self, blocks: Vec<Arc<SignedBeaconBlock>>) -> Result<()> {
        self.ensure_not_halted()?;

        let _timer = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.block_batch_processing_times.start_timer());

        for (parent, child) in blocks.iter().tuple_windows() {
            let expected = parent.root();
            let actual = child.parent_root();

            ensure!(
                expected == actual,
                ReceiveBlockError::BatchNotLinked { expected, actual },
            );
        }

        let snapshot = self.store_lock.owned_snapshot();

        let blocks = blocks
            .into_iter()
            .skip_while(|block| snapshot.contains_block(block.root()))
            .map(|block| Arc::new(SignedBeaconBlock::clone(&block)))
            .collect_vec();

        let Some(first_block) = blocks.first() else {
            debug!("ignoring batch of blocks that are all known");
            return Ok(());
        };

        let parent_root = first_block.parent_root();

        ensure!(
            snapshot.contains_block(parent_root),
            ReceiveBlockError::NotDescendantOfFinalized {
                block_root: first_block.root(),
            },
        );

        let pre_state = self
            .state_generator
            .state_before_or_at_slot(parent_root, first_block.slot())
            .with_context(|| ReceiveBlockError::PreStateUnavailable { parent_root })?;

        let justified_epoch = snapshot.justified_epoch();
        let finalized_epoch = snapshot.finalized_epoch();
        let block_roots = blocks.iter().map(|block| block.root()).collect_vec();

        let (post_states, payload_statuses) = futures::try_join!(
            self.transition_batch_in_background(snapshot, pre_state, blocks.clone()),
            self.check_payloads(&blocks, &block_roots),
        )?;

        let mut store = self.store_lock.lock();

        // Blocks are applied to a copy so that a failure partway through the batch leaves fork
        // choice untouched.
        let mut candidate = store.clone();
        let mut justified_checkpoint_updated = false;
        let mut finalized_checkpoint_updated = false;
        let mut committed = Vec::with_capacity(blocks.len());

        for ((block, block_root), post_state) in blocks.iter().zip(&block_roots).zip(&post_states) {
            if candidate.contains_block(*block_root) {
                continue;
            }

            let changes = candidate.apply_block(
                block.clone_arc(),
                post_state,
                initial_payload_status(block),
            )?;

            justified_checkpoint_updated |= changes.is_justified_checkpoint_updated();
            finalized_checkpoint_updated |= changes.is_finalized_checkpoint_updated();

            apply_block_slashings(&mut candidate, block);

            committed.push((block.clone_arc(), *block_root, post_state.clone_arc()));
        }

        // Only the payload of the last block decides whether the batch is fully validated.
        if let (Some(last_root), Some(last_status)) = (block_roots.last(), payload_statuses.last())
        {
            if last_status.is_valid() && candidate.contains_block(*last_root) {
                candidate.mark_valid(*last_root)?;
            }
        }

        self.verify_finalized_chain(&candidate, finalized_checkpoint_updated, finalized_epoch)?;

        for (_, block_root, post_state) in &committed {
            self.state_generator.save_state(*block_root, post_state)?;
        }

        let committed = committed
            .into_iter()
            .map(|(block, _, _)| block)
            .collect_vec();

        if !committed.is_empty() {
            self.storage.save_blocks(&committed)?;
        }

        *store = candidate;

        for block in &committed {
            self.pool_block_attestations(block);
        }

        let newly_finalized = self.finish_commit(
            &mut store,
            justified_checkpoint_updated,
            finalized_checkpoint_updated,
            justified_epoch,
            finalized_epoch,
        )?;

        for block in &committed {
            let block_root = block.root();
            let execution_optimistic = store.is_optimistic(block_root).unwrap_or_default();

            self.event_channels
                .send_block_event(block.slot(), block_root, execution_optimistic);
        }

        drop(store);

        if let Some(finalized_checkpoint) = newly_finalized {
            self.on_finalized(finalized_checkpoint);
        }

        let head_root = self.head.block_root();

        for ((block, block_root), post_state) in blocks.iter().zip(&block_roots).zip(&post_states) {
            self.forward_to_slasher(block, *block_root, post_state);

            if *block_root == head_root {
                self.operation_pools.mark_included(block.body());
            }
        }

        self.update_hot_state_saving();
        self.track_collection_metrics();

        if let (Some(first), Some(last)) = (committed.first(), committed.last()) {
            info!(
                "block batch accepted \
                 (blocks: {}, first slot: {}, last slot: {}, head: {head_root:?})",
                committed.len(),
                first.slot(),
                last.slot(),
            );
        }

        Ok(())
    }

    /// Applies attestations waiting in the pool and recomputes the head.
    ///
    /// Calling this with no new attestations does not change anything.
    pub fn update_head(&self) -> Result<()> {
        let mut store = self.store_lock.lock();
        self.update_head_locked(&mut store)
    }

    /// Advances the clock of fork choice to `slot`.
    pub fn on_slot(&self, slot: Slot) -> Result<()> {
        let mut store = self.store_lock.lock();

        if store.apply_tick(slot) {
            debug!("fork choice advanced to slot {slot}");
        }

        self.attestation_pool.prune_expired::<P>(slot);
        self.update_head_locked(&mut store)
    }

    /// Saves an unaggregated attestation from gossip or the API.
    ///
    /// Returns `true` if the attestation was new. New attestations are applied to fork choice by
    /// the next call to [`Self::update_head`].
    pub fn receive_attestation(&self, attestation: Attestation) -> Result<bool> {
        let is_new = self.attestation_pool.save_unaggregated(attestation.clone())?;

        if is_new {
            self.attestation_pool.save_forkchoice_attestation(attestation);
        }

        Ok(is_new)
    }

    pub fn receive_aggregate(&self, attestation: Attestation) -> Result<bool> {
        let is_new = self.attestation_pool.save_aggregated(attestation.clone())?;

        if is_new {
            self.attestation_pool.save_forkchoice_attestation(attestation);
        }

        Ok(is_new)
    }

    /// Removes the votes of validators slashed by `attester_slashing` from fork choice and adds the
    /// slashing to the operation pool.
    pub fn receive_attester_slashing(
        &self,
        attester_slashing: AttesterSlashing,
    ) -> Result<PoolAdditionOutcome> {
        self.ensure_not_halted()?;

        let head_state = self.head.state();

        let outcome = self
            .operation_pools
            .insert_attester_slashing::<P>(&head_state, attester_slashing.clone());

        if let PoolAdditionOutcome::Reject(_, error) = &outcome {
            debug!("attester slashing not applied to fork choice: {error}");
            return Ok(outcome);
        }

        let slashable_indices = slashable_indices(&attester_slashing);

        {
            let mut store = self.store_lock.lock();

            if let Some(old_head) = store.apply_attester_slashing(slashable_indices) {
                debug!(
                    "head changed after attester slashing (old head: {:?})",
                    old_head.block_root,
                );
            }

            self.refresh_head(&store)?;
        }

        if outcome.is_accepted() {
            self.event_channels
                .send_attester_slashing_event(attester_slashing);
        }

        Ok(outcome)
    }

    pub fn receive_proposer_slashing(
        &self,
        proposer_slashing: ProposerSlashing,
    ) -> PoolAdditionOutcome {
        let outcome = self
            .operation_pools
            .insert_proposer_slashing::<P>(&self.head.state(), proposer_slashing.clone());

        if outcome.is_accepted() {
            self.event_channels
                .send_proposer_slashing_event(proposer_slashing.clone());

            SlasherMessage::ProposerSlashing(Box::new(proposer_slashing)).send(&self.slasher_tx);
        }

        outcome
    }

    pub fn receive_voluntary_exit(
        &self,
        voluntary_exit: SignedVoluntaryExit,
    ) -> PoolAdditionOutcome {
        let outcome = self.operation_pools.insert_voluntary_exit::<P>(
            &self.chain_config,
            &self.head.state(),
            voluntary_exit.clone(),
        );

        if outcome.is_accepted() {
            self.event_channels.send_voluntary_exit_event(voluntary_exit);
        }

        outcome
    }

    pub fn receive_bls_to_execution_change(
        &self,
        bls_to_execution_change: SignedBlsToExecutionChange,
    ) -> PoolAdditionOutcome {
        let outcome = self
            .operation_pools
            .insert_bls_to_execution_change(&self.head.state(), bls_to_execution_change.clone());

        if outcome.is_accepted() {
            self.event_channels
                .send_bls_to_execution_change_event(bls_to_execution_change);
        }

        outcome
    }

    /// Records a payload verdict that arrived after the block was committed.
    pub fn on_payload_status(&self, block_root: H256, payload_status: PayloadStatus) -> Result<()> {
        let mut store = self.store_lock.lock();

        match payload_status {
            PayloadStatus::Valid => store.mark_valid(block_root)?,
            PayloadStatus::Invalid => {
                warn!("execution payload of block {block_root:?} is invalid");

                if let Some(old_head) = store.mark_invalid(block_root)? {
                    warn!(
                        "head {:?} was invalidated along with its payload",
                        old_head.block_root,
                    );
                }
            }
            PayloadStatus::Optimistic => return Ok(()),
        }

        self.refresh_head(&store)
    }

    /// Waits for background tasks started by previous calls.
    pub async fn wait_for_tasks(&self) {
        let tasks = core::mem::take(&mut *self.pending_tasks.lock());

        for task in tasks {
            if let Err(error) = task.await {
                warn!("background task failed: {error}");
            }
        }
    }

    async fn validate_in_background(
        &self,
        store: Arc<Store<P>>,
        pre_state: Arc<BeaconState>,
        block: Arc<SignedBeaconBlock>,
        block_root: H256,
    ) -> Result<Arc<BeaconState>> {
        let block_processor = self.block_processor.clone_arc();

        tokio::task::spawn_blocking(move || {
            block_processor.validate_block(&store, pre_state, &block, block_root)
        })
        .await?
    }

    async fn transition_batch_in_background(
        &self,
        store: Arc<Store<P>>,
        pre_state: Arc<BeaconState>,
        blocks: Vec<Arc<SignedBeaconBlock>>,
    ) -> Result<Vec<Arc<BeaconState>>> {
        let block_processor = self.block_processor.clone_arc();

        tokio::task::spawn_blocking(move || -> Result<_> {
            let mut state = pre_state;
            let mut post_states = Vec::with_capacity(blocks.len());

            for (index, block) in blocks.iter().enumerate() {
                let block_root = block.root();

                // Later blocks descend from blocks that are not in `store` yet.
                state = if index == 0 {
                    block_processor.validate_block(&store, state, block, block_root)?
                } else {
                    block_processor.transition_block(state, block, block_root)?
                };

                post_states.push(state.clone_arc());
            }

            Ok(post_states)
        })
        .await?
    }

    async fn check_payloads(
        &self,
        blocks: &[Arc<SignedBeaconBlock>],
        block_roots: &[H256],
    ) -> Result<Vec<PayloadStatus>> {
        let mut payload_statuses = Vec::with_capacity(blocks.len());

        for (block, block_root) in blocks.iter().zip(block_roots) {
            payload_statuses.push(self.check_payload(block, *block_root).await?);
        }

        Ok(payload_statuses)
    }

    /// Asks the execution engine to validate the payload of `block`.
    ///
    /// An unreachable or unresponsive engine leaves the block optimistic.
    async fn check_payload(
        &self,
        block: &SignedBeaconBlock,
        block_root: H256,
    ) -> Result<PayloadStatus> {
        let payload = match block.body().post_capella() {
            Some(body) => body.execution_payload().clone(),
            None => return Ok(PayloadStatus::Valid),
        };

        if E::IS_NULL {
            return Ok(PayloadStatus::Optimistic);
        }

        let (sender, receiver) = oneshot::channel();

        if let Err(error) = self
            .execution_engine
            .notify_new_payload(block_root, payload, Some(sender))
        {
            warn!(
                "execution engine unavailable; \
                 importing block {block_root:?} optimistically: {error}",
            );
            return Ok(PayloadStatus::Optimistic);
        }

        let response = match receiver.await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                warn!(
                    "execution engine failed to validate payload of block {block_root:?}: {error}",
                );
                return Ok(PayloadStatus::Optimistic);
            }
            Err(_) => {
                debug!("execution engine did not respond for block {block_root:?}");
                return Ok(PayloadStatus::Optimistic);
            }
        };

        if response.status.is_invalid() {
            self.invalidate_optimistic_ancestors(block.parent_root(), response.latest_valid_hash)?;

            bail!(ReceiveBlockError::InvalidExecutionPayload {
                block_root,
                latest_valid_hash: response.latest_valid_hash,
            });
        }

        Ok(response.status.payload_status())
    }

    /// Marks optimistic ancestors newer than `latest_valid_hash` as invalid.
    ///
    /// Nothing is invalidated if the block with `latest_valid_hash` is not an ancestor.
    fn invalidate_optimistic_ancestors(
        &self,
        parent_root: H256,
        latest_valid_hash: Option<ExecutionBlockHash>,
    ) -> Result<()> {
        let Some(latest_valid_hash) = latest_valid_hash else {
            return Ok(());
        };

        let mut store = self.store_lock.lock();
        let mut current_root = parent_root;
        let mut invalid_root = None;
        let mut valid_root = None;

        while let Some(node) = store.node(current_root) {
            if node.execution_block_hash() == Some(latest_valid_hash) {
                valid_root = Some(node.block_root);
                break;
            }

            if !node.is_optimistic() {
                break;
            }

            invalid_root = Some(node.block_root);
            current_root = node.parent_root();
        }

        let Some(valid_root) = valid_root else {
            return Ok(());
        };

        if let Some(invalid_root) = invalid_root {
            warn!(
                "invalidating optimistic blocks descending from {valid_root:?} \
                 (first: {invalid_root:?})",
            );
            store.mark_invalid(invalid_root)?;
        }

        store.mark_valid(valid_root)?;

        self.refresh_head(&store)
    }

    /// Returns `None` if the block was committed by someone else first.
    /// Otherwise returns the finalized checkpoint if the block advanced it.
    fn commit_block(
        &self,
        block: &Arc<SignedBeaconBlock>,
        block_root: H256,
        post_state: &Arc<BeaconState>,
        payload_status: PayloadStatus,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<Option<Option<Checkpoint>>> {
        let mut store = self.store_lock.lock();

        if store.contains_block(block_root) {
            debug!("block was committed concurrently: {block_root:?}");
            return Ok(None);
        }

        let mut candidate = store.clone();
        let changes = candidate.apply_block(block.clone_arc(), post_state, payload_status)?;

        apply_block_slashings(&mut candidate, block);

        self.verify_finalized_chain(
            &candidate,
            changes.is_finalized_checkpoint_updated(),
            finalized_epoch,
        )?;

        self.storage.save_block(block)?;
        self.state_generator.save_state(block_root, post_state)?;

        *store = candidate;

        self.pool_block_attestations(block);

        let newly_finalized = self.finish_commit(
            &mut store,
            changes.is_justified_checkpoint_updated(),
            changes.is_finalized_checkpoint_updated(),
            justified_epoch,
            finalized_epoch,
        )?;

        self.event_channels.send_block_event(
            block.slot(),
            block_root,
            payload_status.is_optimistic(),
        );

        Ok(Some(newly_finalized))
    }

    /// Saves attestations in a committed block to the attestation pool.
    ///
    /// They reach fork choice through the forkchoice bucket on the next head update.
    fn pool_block_attestations(&self, block: &SignedBeaconBlock) {
        for attestation in block.body().attestations() {
            self.attestation_pool
                .save_block_attestation(attestation.clone());

            self.attestation_pool
                .save_forkchoice_attestation(attestation.clone());
        }
    }

    /// Halts fork choice if a newly finalized checkpoint conflicts with the weak subjectivity
    /// checkpoint.
    ///
    /// Must run before anything derived from `store` is persisted.
    fn verify_finalized_chain(
        &self,
        store: &Store<P>,
        finalized_checkpoint_updated: bool,
        finalized_epoch: Epoch,
    ) -> Result<()> {
        if !finalized_checkpoint_updated || store.finalized_epoch() <= finalized_epoch {
            return Ok(());
        }

        if let Err(error) = self.weak_subjectivity_verifier.verify(store) {
            error!("halting fork choice: {error:?}");
            self.halted.store(true, Ordering::SeqCst);
            return Err(error);
        }

        Ok(())
    }

    /// Persists checkpoints and updates the head.
    ///
    /// Checkpoints are only treated as new if they are newer than the epochs captured before the
    /// store lock was acquired.
    fn finish_commit(
        &self,
        store: &mut Store<P>,
        justified_checkpoint_updated: bool,
        finalized_checkpoint_updated: bool,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<Option<Checkpoint>> {
        let justified_checkpoint = store.justified_checkpoint();
        let finalized_checkpoint = store.finalized_checkpoint();

        if justified_checkpoint_updated && justified_checkpoint.epoch > justified_epoch {
            self.storage.save_justified_checkpoint(justified_checkpoint)?;

            if let Some(metrics) = self.metrics.as_ref() {
                metrics.set_justified_epoch(justified_checkpoint.epoch);
            }
        }

        let newly_finalized =
            finalized_checkpoint_updated && finalized_checkpoint.epoch > finalized_epoch;

        if newly_finalized {
            self.storage.save_finalized_checkpoint(finalized_checkpoint)?;
        }

        self.refresh_head(store)?;

        if newly_finalized && self.controller_config.archive_finalized {
            self.prune_finalized(store)?;
        }

        Ok(newly_finalized.then_some(finalized_checkpoint))
    }

    fn update_head_locked(&self, store: &mut Store<P>) -> Result<()> {
        let _timer = self
            .metrics
            .as_ref()
            .and_then(|metrics| {
                prometheus_metrics::start_timer_vec(&metrics.fc_task_times, "update_head")
            });

        let mut valid_attestations = vec![];
        let mut processed = vec![];

        for attestation in self.attestation_pool.forkchoice_attestations() {
            match store.validate_attestation(attestation.data) {
                Ok(AttestationAction::Accept) => match self.attesting_indices(&attestation) {
                    Ok(attesting_indices) => {
                        valid_attestations.push(ValidAttestation {
                            data: attestation.data,
                            attesting_indices,
                        });

                        processed.push(attestation);
                    }
                    Err(error) => {
                        debug!("keeping attestation whose committee is unavailable: {error}");
                    }
                },
                Ok(AttestationAction::DelayUntilBlock(block_root)) => {
                    if Feature::IgnoreAttestationsForUnknownBlocks.is_enabled() {
                        debug!("dropping attestation for unknown block {block_root:?}");
                        processed.push(attestation);
                    } else {
                        debug!("keeping attestation for unknown block {block_root:?}");
                    }
                }
                Ok(AttestationAction::DelayUntilSlot(_)) => {}
                Err(error) => {
                    debug!("dropping attestation rejected by fork choice: {error}");
                    processed.push(attestation);
                }
            }
        }

        if !valid_attestations.is_empty() {
            debug!("applying {} attestations to fork choice", valid_attestations.len());
            store.apply_attestations(valid_attestations);
        }

        self.attestation_pool
            .remove_forkchoice_attestations(&processed);

        self.refresh_head(store)
    }

    fn attesting_indices(&self, attestation: &Attestation) -> Result<Vec<ValidatorIndex>> {
        let target_state = self.state_generator.checkpoint_state(attestation.data.target)?;

        accessors::get_attesting_indices::<P>(
            &*target_state,
            attestation.data,
            &attestation.aggregation_bits,
        )
    }

    /// Publishes the head chosen by `store`.
    ///
    /// Events and the execution engine are only notified if the head changed.
    fn refresh_head(&self, store: &Store<P>) -> Result<()> {
        let node = store.head();
        let block_root = node.block_root;

        if self.head.block_root() == block_root {
            self.head.set_optimistic(block_root, node.is_optimistic());
            return Ok(());
        }

        let new_head = Head {
            block_root,
            block: node.block.clone_arc(),
            state: self.state_generator.state_by_root(block_root)?,
            is_optimistic: node.is_optimistic(),
        };

        let old_head = self.head.replace(new_head.clone());

        if store.is_reorganization(old_head.block_root) {
            let common_ancestor_slot = common_ancestor_slot(store, old_head.block_root, block_root);

            info!(
                "chain reorganized \
                 (old head: {:?} at slot {}, new head: {block_root:?} at slot {}, \
                 common ancestor slot: {common_ancestor_slot})",
                old_head.block_root,
                old_head.slot(),
                new_head.slot(),
            );

            if let Some(metrics) = self.metrics.as_ref() {
                metrics.beacon_reorgs_total.inc();
            }

            self.event_channels
                .send_chain_reorg_event::<P>(&old_head, &new_head, common_ancestor_slot);
        }

        self.event_channels.send_head_event::<P>(&new_head);

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_head_slot(new_head.slot());
        }

        self.notify_forkchoice_updated(store);

        Ok(())
    }

    fn notify_forkchoice_updated(&self, store: &Store<P>) {
        if E::IS_NULL {
            return;
        }

        let Some(head_block_hash) = store.head().execution_block_hash() else {
            return;
        };

        let block_hash = |block_root| {
            store
                .node(block_root)
                .and_then(Node::execution_block_hash)
                .unwrap_or_default()
        };

        self.execution_engine
            .notify_forkchoice_updated(ForkChoiceStateV1 {
                head_block_hash,
                safe_block_hash: block_hash(store.justified_checkpoint().root),
                finalized_block_hash: block_hash(store.finalized_checkpoint().root),
            });
    }

    fn prune_finalized(&self, store: &mut Store<P>) -> Result<()> {
        store.prune_finalized();

        self.state_generator.prune(store.finalized_slot())?;
        self.attestation_pool.prune_finalized(store.finalized_epoch());

        Ok(())
    }

    fn on_finalized(&self, finalized_checkpoint: Checkpoint) {
        let head = self.head.get();

        info!(
            "finalized checkpoint updated (epoch: {}, root: {:?}, head slot: {}, head root: {:?})",
            finalized_checkpoint.epoch,
            finalized_checkpoint.root,
            head.slot(),
            head.block_root,
        );

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_finalized_epoch(finalized_checkpoint.epoch);
        }

        self.event_channels
            .send_finalized_checkpoint_event(finalized_checkpoint, head.is_optimistic);

        match self.state_generator.state_by_root(finalized_checkpoint.root) {
            Ok(finalized_state) => {
                let task = tasks::spawn_deposit_finalization(
                    self.deposit_finalizer.clone_arc(),
                    finalized_state.eth1_deposit_index(),
                    finalized_checkpoint.root,
                    self.controller_config.deposit_deadline,
                );

                let mut pending_tasks = self.pending_tasks.lock();
                pending_tasks.retain(|task| !task.is_finished());
                pending_tasks.push(task);
            }
            Err(error) => {
                warn!("deposits not finalized because finalized state is unavailable: {error:?}");
            }
        }
    }

    fn forward_to_slasher(&self, block: &SignedBeaconBlock, block_root: H256, state: &BeaconState) {
        if !self.controller_config.forward_attestations_to_slasher || self.slasher_tx.is_none() {
            return;
        }

        let attestations = block
            .body()
            .attestations()
            .iter()
            .filter_map(|attestation| {
                accessors::get_indexed_attestation::<P>(state, attestation)
                    .map_err(|error| debug!("attestation not forwarded to slasher: {error}"))
                    .ok()
            })
            .collect_vec();

        if attestations.is_empty() {
            return;
        }

        SlasherMessage::Attestations {
            block_root,
            attestations,
        }
        .send(&self.slasher_tx);
    }

    /// Writes every hot state to storage while finality is delayed.
    fn update_hot_state_saving(&self) {
        let store = self.store_lock.snapshot();
        let epochs_since_finality = store.current_epoch().saturating_sub(store.finalized_epoch());

        if epochs_since_finality > self.controller_config.epochs_since_finality_threshold {
            self.state_generator.enable_save_hot_state_to_db();
        } else {
            self.state_generator.disable_save_hot_state_to_db();
        }
    }

    fn track_collection_metrics(&self) {
        if let Some(metrics) = self.metrics.as_ref() {
            self.attestation_pool.track_collection_metrics(metrics);
            self.operation_pools.track_collection_metrics(metrics);
        }
    }

    fn ensure_not_halted(&self) -> Result<()> {
        ensure!(!self.halted.load(Ordering::SeqCst), ReceiveBlockError::Halted);
        Ok(())
    }
}

fn initial_payload_status(block: &SignedBeaconBlock) -> PayloadStatus {
    if block.body().post_capella().is_some() {
        PayloadStatus::Optimistic
    } else {
        PayloadStatus::Valid
    }
}

fn apply_block_slashings<P: Preset>(store: &mut Store<P>, block: &SignedBeaconBlock) {
    for attester_slashing in block.body().attester_slashings() {
        store.apply_attester_slashing(slashable_indices(attester_slashing));
    }
}

fn slashable_indices(attester_slashing: &AttesterSlashing) -> Vec<ValidatorIndex> {
    let indices_2 = attester_slashing
        .attestation_2
        .attesting_indices
        .iter()
        .collect::<HashSet<_>>();

    attester_slashing
        .attestation_1
        .attesting_indices
        .iter()
        .filter(|index| indices_2.contains(index))
        .copied()
        .collect()
}

fn common_ancestor_slot<P: Preset>(
    store: &Store<P>,
    old_head_root: H256,
    new_head_root: H256,
) -> Slot {
    let mut current_root = old_head_root;

    while let Some(node) = store.node(current_root) {
        if store.is_descendant(new_head_root, node.block_root) {
            return node.slot();
        }

        current_root = node.parent_root();
    }

    store.finalized_slot()
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::containers::{AttestationData, IndexedAttestation},
        preset::Minimal,
    };

    use super::*;

    fn indexed_attestation(
        attesting_indices: Vec<ValidatorIndex>,
        slot: Slot,
    ) -> IndexedAttestation {
        IndexedAttestation {
            attesting_indices,
            data: AttestationData {
                slot,
                ..AttestationData::default()
            },
            signatures: vec![],
        }
    }

    #[test]
    fn slashable_indices_are_the_intersection() {
        let attester_slashing = AttesterSlashing {
            attestation_1: indexed_attestation(vec![1, 2, 3, 5], 1),
            attestation_2: indexed_attestation(vec![2, 5, 8], 2),
        };

        assert_eq!(slashable_indices(&attester_slashing), [2, 5]);
    }

    #[test]
    fn blocks_with_payloads_start_optimistic() -> Result<()> {
        let config = ChainConfig::minimal();
        let state = factory::min_genesis_state::<Minimal>(&config)?;
        let block = factory::genesis_block(&state);

        assert_eq!(initial_payload_status(&block), PayloadStatus::Optimistic);

        Ok(())
    }
}
