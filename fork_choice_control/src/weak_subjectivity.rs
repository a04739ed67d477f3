use core::sync::atomic::{AtomicBool, Ordering};

use anyhow::{ensure, Result};
use fork_choice_store::Store;
use helper_functions::misc;
use log::info;
use types::{phase0::containers::Checkpoint, preset::Preset};

use crate::error::ReceiveBlockError;

/// Checks that the finalized chain passes through a trusted checkpoint.
///
/// The check can only be made once the finalized epoch reaches the epoch of the checkpoint.
/// After it succeeds once it is not repeated.
#[derive(Default)]
pub struct WeakSubjectivityVerifier {
    checkpoint: Option<Checkpoint>,
    verified: AtomicBool,
}

impl WeakSubjectivityVerifier {
    #[must_use]
    pub const fn new(checkpoint: Option<Checkpoint>) -> Self {
        Self {
            checkpoint,
            verified: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint
    }

    pub fn verify<P: Preset>(&self, store: &Store<P>) -> Result<()> {
        let Some(weak_subjectivity_checkpoint) = self.checkpoint else {
            return Ok(());
        };

        if self.verified.load(Ordering::SeqCst) {
            return Ok(());
        }

        let finalized_checkpoint = store.finalized_checkpoint();

        if finalized_checkpoint.epoch < weak_subjectivity_checkpoint.epoch {
            return Ok(());
        }

        let slot = misc::compute_start_slot_at_epoch::<P>(weak_subjectivity_checkpoint.epoch);

        ensure!(
            store.ancestor(finalized_checkpoint.root, slot)
                == Some(weak_subjectivity_checkpoint.root),
            ReceiveBlockError::WeakSubjectivityViolation {
                weak_subjectivity_checkpoint,
                finalized_checkpoint,
            },
        );

        info!(
            "finalized chain matches weak subjectivity checkpoint \
             {weak_subjectivity_checkpoint:?}",
        );

        self.verified.store(true, Ordering::SeqCst);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fork_choice_store::StoreConfig;
    use types::{config::Config, phase0::primitives::H256, preset::Minimal};

    use super::*;
    use crate::error::ErrorKind;

    fn genesis_store() -> Result<Store<Minimal>> {
        let config = Arc::new(Config::minimal());
        let state = factory::min_genesis_state::<Minimal>(&config)?;
        let block = factory::genesis_block(&state);
        Store::new(config, StoreConfig::default(), block, &state)
    }

    #[test]
    fn verifier_without_checkpoint_accepts_everything() -> Result<()> {
        WeakSubjectivityVerifier::default().verify(&genesis_store()?)
    }

    #[test]
    fn matching_checkpoint_is_accepted() -> Result<()> {
        let store = genesis_store()?;

        let checkpoint = Checkpoint {
            epoch: 0,
            root: store.anchor_root(),
        };

        WeakSubjectivityVerifier::new(Some(checkpoint)).verify(&store)
    }

    #[test]
    fn conflicting_checkpoint_is_a_violation() -> Result<()> {
        let store = genesis_store()?;

        let checkpoint = Checkpoint {
            epoch: 0,
            root: H256::repeat_byte(0xaa),
        };

        let error = WeakSubjectivityVerifier::new(Some(checkpoint))
            .verify(&store)
            .expect_err("finalized chain does not contain checkpoint root");

        assert_eq!(ErrorKind::of(&error), ErrorKind::WeakSubjectivityViolation);

        Ok(())
    }

    #[test]
    fn checkpoint_from_future_epoch_is_not_checked_yet() -> Result<()> {
        let store = genesis_store()?;

        let checkpoint = Checkpoint {
            epoch: 10,
            root: H256::repeat_byte(0xaa),
        };

        WeakSubjectivityVerifier::new(Some(checkpoint)).verify(&store)
    }
}
