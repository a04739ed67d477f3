use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use execution_engine::MockExecutionEngine;
use helper_functions::misc;
use parking_lot::Mutex;
use std_ext::ArcExt as _;
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config,
    phase0::{
        containers::Checkpoint,
        primitives::{DepositIndex, Epoch, Slot, H256},
    },
    preset::Minimal,
    traits::SignedBeaconBlock as _,
};

use crate::{
    controller::Controller,
    controller_config::ControllerConfig,
    error::ErrorKind,
    storage::{DatabaseStorage, Storage},
    tasks::DepositFinalizer,
};

pub type TestController = Controller<Minimal, Arc<MockExecutionEngine>, CountingStorage>;

/// [`DatabaseStorage`] that counts batched writes.
#[derive(Default)]
pub struct CountingStorage {
    inner: DatabaseStorage,
    save_blocks_calls: AtomicUsize,
    blocks_saved_in_batches: AtomicUsize,
}

impl CountingStorage {
    pub fn save_blocks_calls(&self) -> usize {
        self.save_blocks_calls.load(Ordering::SeqCst)
    }

    pub fn blocks_saved_in_batches(&self) -> usize {
        self.blocks_saved_in_batches.load(Ordering::SeqCst)
    }
}

impl Storage for CountingStorage {
    fn save_block(&self, block: &SignedBeaconBlock) -> Result<()> {
        self.inner.save_block(block)
    }

    fn save_blocks(&self, blocks: &[Arc<SignedBeaconBlock>]) -> Result<()> {
        self.save_blocks_calls.fetch_add(1, Ordering::SeqCst);
        self.blocks_saved_in_batches
            .fetch_add(blocks.len(), Ordering::SeqCst);

        self.inner.save_blocks(blocks)
    }

    fn save_state(&self, block_root: H256, state: &BeaconState) -> Result<()> {
        self.inner.save_state(block_root, state)
    }

    fn save_justified_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        self.inner.save_justified_checkpoint(checkpoint)
    }

    fn save_finalized_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        self.inner.save_finalized_checkpoint(checkpoint)
    }

    fn has_block(&self, block_root: H256) -> Result<bool> {
        self.inner.has_block(block_root)
    }

    fn block_by_root(&self, block_root: H256) -> Result<Option<Arc<SignedBeaconBlock>>> {
        self.inner.block_by_root(block_root)
    }

    fn state_by_block_root(&self, block_root: H256) -> Result<Option<Arc<BeaconState>>> {
        self.inner.state_by_block_root(block_root)
    }

    fn justified_checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.inner.justified_checkpoint()
    }

    fn finalized_checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.inner.finalized_checkpoint()
    }

    fn block_root_by_slot(&self, slot: Slot) -> Result<Option<H256>> {
        self.inner.block_root_by_slot(slot)
    }
}

#[derive(Default)]
pub struct RecordingDepositFinalizer {
    calls: Mutex<Vec<(DepositIndex, H256)>>,
}

impl RecordingDepositFinalizer {
    pub fn calls(&self) -> Vec<(DepositIndex, H256)> {
        self.calls.lock().clone()
    }
}

impl DepositFinalizer for RecordingDepositFinalizer {
    fn finalize_deposits(
        &self,
        eth1_deposit_index: DepositIndex,
        finalized_root: H256,
    ) -> Result<()> {
        self.calls.lock().push((eth1_deposit_index, finalized_root));
        Ok(())
    }
}

pub struct Context {
    config: Arc<Config>,
    genesis_block: Arc<SignedBeaconBlock>,
    genesis_state: Arc<BeaconState>,
    execution_engine: Arc<MockExecutionEngine>,
    storage: Arc<CountingStorage>,
    deposit_finalizer: Arc<RecordingDepositFinalizer>,
    controller: TestController,
}

impl Context {
    pub fn minimal() -> Self {
        Self::new(ControllerConfig::default(), |controller| controller)
    }

    pub fn new(
        controller_config: ControllerConfig,
        customize: impl FnOnce(TestController) -> TestController,
    ) -> Self {
        env_logger::builder().is_test(true).try_init().ok();

        let config = Arc::new(Config::minimal());

        let genesis_state =
            factory::min_genesis_state::<Minimal>(&config).expect("genesis state can be built");

        let genesis_block = factory::genesis_block(&genesis_state);
        let execution_engine = Arc::new(MockExecutionEngine::new(true));
        let storage = Arc::new(CountingStorage::default());
        let deposit_finalizer = Arc::new(RecordingDepositFinalizer::default());

        let controller = Controller::new(
            config.clone_arc(),
            controller_config,
            genesis_block.clone_arc(),
            genesis_state.clone_arc(),
            execution_engine.clone_arc(),
            storage.clone_arc(),
            None,
        )
        .expect("controller can be started from genesis")
        .with_deposit_finalizer(deposit_finalizer.clone_arc());

        Self {
            config,
            genesis_block,
            genesis_state,
            execution_engine,
            storage,
            deposit_finalizer,
            controller: customize(controller),
        }
    }

    pub const fn controller(&self) -> &TestController {
        &self.controller
    }

    pub fn execution_engine(&self) -> &MockExecutionEngine {
        &self.execution_engine
    }

    pub fn storage(&self) -> &CountingStorage {
        &self.storage
    }

    pub fn deposit_finalizer(&self) -> &RecordingDepositFinalizer {
        &self.deposit_finalizer
    }

    pub fn genesis(&self) -> (Arc<SignedBeaconBlock>, Arc<BeaconState>) {
        (self.genesis_block.clone_arc(), self.genesis_state.clone_arc())
    }

    pub fn empty_block(
        &self,
        pre_state: &Arc<BeaconState>,
        slot: Slot,
        graffiti: H256,
    ) -> (Arc<SignedBeaconBlock>, Arc<BeaconState>) {
        factory::empty_block::<Minimal>(&self.config, pre_state.clone_arc(), slot, graffiti)
            .expect("empty block can be built")
    }

    pub fn full_block(
        &self,
        pre_state: &Arc<BeaconState>,
        slot: Slot,
    ) -> (Arc<SignedBeaconBlock>, Arc<BeaconState>) {
        factory::full_block::<Minimal>(&self.config, pre_state.clone_arc(), slot)
            .expect("full block can be built")
    }

    pub fn full_blocks_up_to_epoch(
        &self,
        pre_state: &Arc<BeaconState>,
        epoch: Epoch,
    ) -> (Vec<Arc<SignedBeaconBlock>>, Arc<BeaconState>) {
        factory::full_blocks_up_to_epoch::<Minimal>(&self.config, pre_state.clone_arc(), epoch)
            .expect("chain of full blocks can be built")
    }

    /// Builds blocks at `slots` on top of genesis, each extending the previous one.
    pub fn empty_chain(
        &self,
        slots: impl IntoIterator<Item = Slot>,
    ) -> (Vec<Arc<SignedBeaconBlock>>, Arc<BeaconState>) {
        let mut state = self.genesis_state.clone_arc();
        let mut blocks = vec![];

        for slot in slots {
            let (block, post_state) = self.empty_block(&state, slot, H256::zero());
            blocks.push(block);
            state = post_state;
        }

        (blocks, state)
    }

    pub async fn receive(&self, block: &Arc<SignedBeaconBlock>) {
        self.controller
            .receive_block(block.clone_arc())
            .await
            .expect("block should be accepted");
    }

    pub async fn receive_all(&self, blocks: &[Arc<SignedBeaconBlock>]) {
        for block in blocks {
            self.receive(block).await;
        }
    }

    pub async fn rejection_of(&self, block: &Arc<SignedBeaconBlock>) -> ErrorKind {
        let error = self
            .controller
            .receive_block(block.clone_arc())
            .await
            .expect_err("block should be rejected");

        ErrorKind::of(&error)
    }

    pub fn assert_head(&self, block: &SignedBeaconBlock) {
        let head = self.controller.head();

        assert_eq!(head.block_root, block.root());
        assert_eq!(head.slot(), block.slot());
    }
}

pub const fn start_of_epoch(epoch: Epoch) -> Slot {
    misc::compute_start_slot_at_epoch::<Minimal>(epoch)
}
