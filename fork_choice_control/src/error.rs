use anyhow::Error as AnyhowError;
use fork_choice_store::Error as StoreError;
use strum::AsRefStr;
use thiserror::Error;
use transition_functions::unphased::Error as TransitionError;
use types::phase0::{
    containers::Checkpoint,
    primitives::{ExecutionBlockHash, H256},
};

#[derive(Debug, Error)]
pub enum ReceiveBlockError {
    #[error("block failed the state transition: {block_root:?}")]
    InvalidBlock { block_root: H256 },
    #[error(
        "execution payload of block is invalid \
         (block_root: {block_root:?}, latest_valid_hash: {latest_valid_hash:?})"
    )]
    InvalidExecutionPayload {
        block_root: H256,
        latest_valid_hash: Option<ExecutionBlockHash>,
    },
    #[error("parent of block is not a known descendant of the finalized block: {block_root:?}")]
    NotDescendantOfFinalized { block_root: H256 },
    #[error("pre-state for block could not be loaded (parent_root: {parent_root:?})")]
    PreStateUnavailable { parent_root: H256 },
    #[error("blocks in batch are not linked (expected parent: {expected:?}, actual: {actual:?})")]
    BatchNotLinked { expected: H256, actual: H256 },
    #[error(
        "finalized checkpoint conflicts with weak subjectivity checkpoint \
         (weak_subjectivity_checkpoint: {weak_subjectivity_checkpoint:?}, \
         finalized_checkpoint: {finalized_checkpoint:?})"
    )]
    WeakSubjectivityViolation {
        weak_subjectivity_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    },
    #[error("controller has halted after a fatal error")]
    Halted,
}

/// Classification of errors returned by [`Controller`] for the layers that feed it.
///
/// [`Controller`]: crate::Controller
#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidBlock,
    InvalidExecutionPayload,
    NotDescendantOfFinalized,
    Transient,
    WeakSubjectivityViolation,
}

impl ErrorKind {
    #[must_use]
    pub fn of(error: &AnyhowError) -> Self {
        if let Some(error) = error.downcast_ref::<ReceiveBlockError>() {
            return match error {
                ReceiveBlockError::InvalidBlock { .. }
                | ReceiveBlockError::BatchNotLinked { .. } => Self::InvalidBlock,
                ReceiveBlockError::InvalidExecutionPayload { .. } => Self::InvalidExecutionPayload,
                ReceiveBlockError::NotDescendantOfFinalized { .. } => {
                    Self::NotDescendantOfFinalized
                }
                ReceiveBlockError::PreStateUnavailable { .. } => Self::Transient,
                ReceiveBlockError::WeakSubjectivityViolation { .. } | ReceiveBlockError::Halted => {
                    Self::WeakSubjectivityViolation
                }
            };
        }

        if let Some(error) = error.downcast_ref::<StoreError>() {
            return match error {
                StoreError::NotDescendantOfFinalized { .. } | StoreError::UnknownBlock { .. } => {
                    Self::NotDescendantOfFinalized
                }
                StoreError::BlockNotNewerThanParent { .. }
                | StoreError::BlockNotNewerThanFinalized { .. }
                | StoreError::ParentPayloadInvalid { .. }
                | StoreError::TooManyEmptySlots { .. } => Self::InvalidBlock,
                _ => Self::Transient,
            };
        }

        if error.is::<TransitionError>() {
            return Self::InvalidBlock;
        }

        Self::Transient
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    #[must_use]
    pub const fn should_penalize_peer(self) -> bool {
        matches!(
            self,
            Self::InvalidBlock | Self::InvalidExecutionPayload | Self::NotDescendantOfFinalized,
        )
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use test_case::test_case;

    use super::*;

    #[test_case(
        AnyhowError::new(StoreError::NotDescendantOfFinalized {
            block_root: H256::zero(),
            parent_root: H256::repeat_byte(0xff),
        }),
        ErrorKind::NotDescendantOfFinalized
    )]
    #[test_case(
        AnyhowError::new(StoreError::TooManyEmptySlots {
            block_slot: 100,
            parent_slot: 1,
            max_empty_slots: 32,
        }),
        ErrorKind::InvalidBlock
    )]
    #[test_case(
        anyhow!("state transition failed").context(ReceiveBlockError::InvalidBlock {
            block_root: H256::zero(),
        }),
        ErrorKind::InvalidBlock
    )]
    #[test_case(
        AnyhowError::new(ReceiveBlockError::InvalidExecutionPayload {
            block_root: H256::zero(),
            latest_valid_hash: None,
        }),
        ErrorKind::InvalidExecutionPayload
    )]
    #[test_case(
        AnyhowError::new(ReceiveBlockError::WeakSubjectivityViolation {
            weak_subjectivity_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
        }),
        ErrorKind::WeakSubjectivityViolation
    )]
    #[test_case(anyhow!("database unavailable"), ErrorKind::Transient)]
    fn errors_are_classified(error: AnyhowError, expected: ErrorKind) {
        assert_eq!(ErrorKind::of(&error), expected);
    }

    #[test]
    fn context_does_not_hide_classification() {
        let error = AnyhowError::new(StoreError::UnknownBlock {
            block_root: H256::zero(),
        })
        .context("failed to apply block")
        .context("outer context");

        assert_eq!(ErrorKind::of(&error), ErrorKind::NotDescendantOfFinalized);
    }

    #[test_case(ErrorKind::InvalidBlock, false, true)]
    #[test_case(ErrorKind::InvalidExecutionPayload, false, true)]
    #[test_case(ErrorKind::NotDescendantOfFinalized, false, true)]
    #[test_case(ErrorKind::Transient, true, false)]
    #[test_case(ErrorKind::WeakSubjectivityViolation, false, false)]
    fn retry_and_penalty_policy(kind: ErrorKind, retryable: bool, penalize: bool) {
        assert_eq!(kind.is_retryable(), retryable);
        assert_eq!(kind.should_penalize_peer(), penalize);
    }
}
