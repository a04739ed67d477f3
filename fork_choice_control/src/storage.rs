use std::sync::Arc;

use anyhow::Result;
use database::Database;
use derive_more::Display;
use serde::{de::DeserializeOwned, Serialize};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    phase0::{
        containers::Checkpoint,
        primitives::{Slot, H256},
    },
    traits::SignedBeaconBlock as _,
};

/// Durable storage for blocks, states and checkpoints.
pub trait Storage: Send + Sync + 'static {
    fn save_block(&self, block: &SignedBeaconBlock) -> Result<()>;

    /// Saves all of `blocks` in one write.
    fn save_blocks(&self, blocks: &[Arc<SignedBeaconBlock>]) -> Result<()>;

    fn save_state(&self, block_root: H256, state: &BeaconState) -> Result<()>;

    fn save_justified_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;

    fn save_finalized_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;

    fn has_block(&self, block_root: H256) -> Result<bool>;

    fn block_by_root(&self, block_root: H256) -> Result<Option<Arc<SignedBeaconBlock>>>;

    fn state_by_block_root(&self, block_root: H256) -> Result<Option<Arc<BeaconState>>>;

    fn justified_checkpoint(&self) -> Result<Option<Checkpoint>>;

    fn finalized_checkpoint(&self) -> Result<Option<Checkpoint>>;

    /// Root of the latest saved block with a slot not greater than `slot`.
    fn block_root_by_slot(&self, slot: Slot) -> Result<Option<H256>>;
}

/// [`Storage`] backed by a key-value [`Database`].
///
/// Values are encoded with `bincode`.
#[derive(Default)]
pub struct DatabaseStorage {
    database: Database,
}

impl DatabaseStorage {
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self { database }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Database::in_memory())
    }

    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.database
    }
}

impl Storage for DatabaseStorage {
    fn save_block(&self, block: &SignedBeaconBlock) -> Result<()> {
        let block_root = block.root();

        self.database.put_batch([
            serialize(BlockByRoot(block_root), block)?,
            serialize(BlockRootBySlot(block.slot()), block_root)?,
        ])
    }

    fn save_blocks(&self, blocks: &[Arc<SignedBeaconBlock>]) -> Result<()> {
        let mut pairs = Vec::with_capacity(blocks.len() * 2);

        for block in blocks {
            let block_root = block.root();
            pairs.push(serialize(BlockByRoot(block_root), &**block)?);
            pairs.push(serialize(BlockRootBySlot(block.slot()), block_root)?);
        }

        self.database.put_batch(pairs)
    }

    fn save_state(&self, block_root: H256, state: &BeaconState) -> Result<()> {
        save(&self.database, StateByBlockRoot(block_root), state)
    }

    fn save_justified_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        save(&self.database, JUSTIFIED_CHECKPOINT_KEY, checkpoint)
    }

    fn save_finalized_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        save(&self.database, FINALIZED_CHECKPOINT_KEY, checkpoint)
    }

    fn has_block(&self, block_root: H256) -> Result<bool> {
        self.database
            .contains_key(BlockByRoot(block_root).to_string())
    }

    fn block_by_root(&self, block_root: H256) -> Result<Option<Arc<SignedBeaconBlock>>> {
        get(&self.database, BlockByRoot(block_root))
    }

    fn state_by_block_root(&self, block_root: H256) -> Result<Option<Arc<BeaconState>>> {
        get(&self.database, StateByBlockRoot(block_root))
    }

    fn justified_checkpoint(&self) -> Result<Option<Checkpoint>> {
        get(&self.database, JUSTIFIED_CHECKPOINT_KEY)
    }

    fn finalized_checkpoint(&self) -> Result<Option<Checkpoint>> {
        get(&self.database, FINALIZED_CHECKPOINT_KEY)
    }

    fn block_root_by_slot(&self, slot: Slot) -> Result<Option<H256>> {
        let Some((key, value)) = self.database.prev(BlockRootBySlot(slot).to_string())? else {
            return Ok(None);
        };

        if !key.starts_with(BlockRootBySlot::PREFIX.as_bytes()) {
            return Ok(None);
        }

        Ok(Some(bincode::deserialize(&value)?))
    }
}

const JUSTIFIED_CHECKPOINT_KEY: &str = "justified";
const FINALIZED_CHECKPOINT_KEY: &str = "finalized";

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
struct BlockByRoot(H256);

impl BlockByRoot {
    const PREFIX: &'static str = "b";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
struct StateByBlockRoot(H256);

impl StateByBlockRoot {
    const PREFIX: &'static str = "s";
}

// Slots are padded so that keys sort in slot order.
#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
struct BlockRootBySlot(Slot);

impl BlockRootBySlot {
    const PREFIX: &'static str = "r";
}

fn save(database: &Database, key: impl core::fmt::Display, value: impl Serialize) -> Result<()> {
    let (key, value) = serialize(key, value)?;
    database.put(key, value)
}

fn get<V: DeserializeOwned>(
    database: &Database,
    key: impl core::fmt::Display,
) -> Result<Option<V>> {
    database
        .get(key.to_string())?
        .map(|bytes| bincode::deserialize(&bytes))
        .transpose()
        .map_err(Into::into)
}

fn serialize(key: impl core::fmt::Display, value: impl Serialize) -> Result<(String, Vec<u8>)> {
    Ok((key.to_string(), bincode::serialize(&value)?))
}

#[cfg(test)]
mod tests {
    use std_ext::ArcExt as _;
    use types::{config::Config, preset::Minimal};

    use super::*;

    #[test]
    fn blocks_states_and_checkpoints_survive_round_trip() -> Result<()> {
        let config = Config::minimal();
        let genesis_state = factory::min_genesis_state::<Minimal>(&config)?;
        let genesis_block = factory::genesis_block(&genesis_state);
        let genesis_root = genesis_block.root();
        let storage = DatabaseStorage::in_memory();

        assert!(!storage.has_block(genesis_root)?);

        storage.save_block(&genesis_block)?;
        storage.save_state(genesis_root, &genesis_state)?;

        let checkpoint = Checkpoint {
            epoch: 3,
            root: genesis_root,
        };

        storage.save_finalized_checkpoint(checkpoint)?;

        assert!(storage.has_block(genesis_root)?);
        assert_eq!(storage.block_by_root(genesis_root)?, Some(genesis_block));
        assert_eq!(
            storage.state_by_block_root(genesis_root)?,
            Some(genesis_state),
        );
        assert_eq!(storage.finalized_checkpoint()?, Some(checkpoint));
        assert_eq!(storage.justified_checkpoint()?, None);

        Ok(())
    }

    #[test]
    fn block_root_by_slot_finds_latest_block_at_or_before_slot() -> Result<()> {
        let config = Config::minimal();
        let genesis_state = factory::min_genesis_state::<Minimal>(&config)?;
        let genesis_block = factory::genesis_block(&genesis_state);
        let (block_2, state_2) =
            factory::empty_block::<Minimal>(&config, genesis_state, 2, H256::zero())?;
        let (block_5, _) = factory::empty_block::<Minimal>(&config, state_2, 5, H256::zero())?;
        let storage = DatabaseStorage::in_memory();

        storage.save_blocks(&[
            genesis_block.clone_arc(),
            block_2.clone_arc(),
            block_5.clone_arc(),
        ])?;

        assert_eq!(storage.block_root_by_slot(0)?, Some(genesis_block.root()));
        assert_eq!(storage.block_root_by_slot(4)?, Some(block_2.root()));
        assert_eq!(storage.block_root_by_slot(100)?, Some(block_5.root()));

        Ok(())
    }
}
