use anyhow::{ensure, Result};
use types::{
    hashing::HashTreeRoot as _,
    traits::{BeaconBlock, BeaconState},
};

use crate::unphased::Error;

#[derive(Clone, Copy)]
pub enum StateRootPolicy {
    Verify,
    Trust,
}

impl StateRootPolicy {
    pub fn verify(
        self,
        state: &impl BeaconState,
        block: &(impl BeaconBlock + ?Sized),
    ) -> Result<()> {
        match self {
            Self::Verify => {
                let computed = state.hash_tree_root();
                let in_block = block.state_root();

                ensure!(
                    computed == in_block,
                    Error::StateRootMismatch { computed, in_block },
                );
            }
            Self::Trust => {}
        }

        Ok(())
    }
}
