use std::sync::Arc;

use anyhow::{ensure, Result};
use futures::channel::oneshot::Sender;
use log::debug;
use parking_lot::Mutex;
use thiserror::Error;
use types::{
    capella::containers::ExecutionPayload,
    phase0::primitives::{ExecutionBlockHash, H256},
};

use crate::types::{ForkChoiceStateV1, PayloadStatusV1, PayloadValidationStatus};

pub trait ExecutionEngine {
    const IS_NULL: bool;

    /// [`notify_forkchoice_updated`](https://github.com/ethereum/consensus-specs/blob/1bfefe301da592375e2e02f65849a96aadec1936/specs/bellatrix/fork-choice.md#notify_forkchoice_updated)
    fn notify_forkchoice_updated(&self, fork_choice_state: ForkChoiceStateV1);

    /// [`notify_new_payload`](https://github.com/ethereum/consensus-specs/blob/1bfefe301da592375e2e02f65849a96aadec1936/specs/bellatrix/beacon-chain.md#notify_new_payload)
    ///
    /// The verdict is delivered through `sender`. Dropping `sender` without a reply means the
    /// engine could not be reached.
    fn notify_new_payload(
        &self,
        beacon_block_root: H256,
        payload: ExecutionPayload,
        sender: Option<Sender<Result<PayloadStatusV1>>>,
    ) -> Result<()>;
}

impl<E: ExecutionEngine> ExecutionEngine for &E {
    const IS_NULL: bool = E::IS_NULL;

    fn notify_forkchoice_updated(&self, fork_choice_state: ForkChoiceStateV1) {
        (*self).notify_forkchoice_updated(fork_choice_state)
    }

    fn notify_new_payload(
        &self,
        beacon_block_root: H256,
        payload: ExecutionPayload,
        sender: Option<Sender<Result<PayloadStatusV1>>>,
    ) -> Result<()> {
        (*self).notify_new_payload(beacon_block_root, payload, sender)
    }
}

impl<E: ExecutionEngine> ExecutionEngine for Arc<E> {
    const IS_NULL: bool = E::IS_NULL;

    fn notify_forkchoice_updated(&self, fork_choice_state: ForkChoiceStateV1) {
        self.as_ref().notify_forkchoice_updated(fork_choice_state)
    }

    fn notify_new_payload(
        &self,
        beacon_block_root: H256,
        payload: ExecutionPayload,
        sender: Option<Sender<Result<PayloadStatusV1>>>,
    ) -> Result<()> {
        self.as_ref()
            .notify_new_payload(beacon_block_root, payload, sender)
    }
}

/// Engine used when no execution client is connected.
///
/// Never replies, which leaves blocks with payloads optimistic.
#[derive(Clone, Copy)]
pub struct NullExecutionEngine;

impl ExecutionEngine for NullExecutionEngine {
    const IS_NULL: bool = true;

    fn notify_forkchoice_updated(&self, _fork_choice_state: ForkChoiceStateV1) {}

    fn notify_new_payload(
        &self,
        _beacon_block_root: H256,
        _payload: ExecutionPayload,
        _sender: Option<Sender<Result<PayloadStatusV1>>>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Engine that answers every payload with a configurable status and records what it was sent.
pub struct MockExecutionEngine {
    status: Mutex<PayloadValidationStatus>,
    reachable: Mutex<bool>,
    notified_payloads: Mutex<Vec<(H256, ExecutionBlockHash)>>,
    fork_choice_updates: Mutex<Vec<ForkChoiceStateV1>>,
}

impl ExecutionEngine for MockExecutionEngine {
    const IS_NULL: bool = false;

    fn notify_forkchoice_updated(&self, fork_choice_state: ForkChoiceStateV1) {
        self.fork_choice_updates.lock().push(fork_choice_state);
    }

    fn notify_new_payload(
        &self,
        beacon_block_root: H256,
        payload: ExecutionPayload,
        sender: Option<Sender<Result<PayloadStatusV1>>>,
    ) -> Result<()> {
        ensure!(*self.reachable.lock(), Error);

        self.notified_payloads
            .lock()
            .push((beacon_block_root, payload.block_hash));

        let status = *self.status.lock();

        let latest_valid_hash = if status.is_valid() {
            Some(payload.block_hash)
        } else if status.is_invalid() {
            Some(payload.parent_hash)
        } else {
            None
        };

        let response = PayloadStatusV1 {
            status,
            latest_valid_hash,
            validation_error: None,
        };

        if let Some(sender) = sender {
            if sender.send(Ok(response)).is_err() {
                debug!("payload status for block {beacon_block_root:?} was not awaited");
            }
        }

        Ok(())
    }
}

impl MockExecutionEngine {
    #[must_use]
    pub fn new(execution_valid: bool) -> Self {
        let status = if execution_valid {
            PayloadValidationStatus::Valid
        } else {
            PayloadValidationStatus::Invalid
        };

        Self::with_status(status)
    }

    #[must_use]
    pub fn with_status(status: PayloadValidationStatus) -> Self {
        Self {
            status: Mutex::new(status),
            reachable: Mutex::new(true),
            notified_payloads: Mutex::default(),
            fork_choice_updates: Mutex::default(),
        }
    }

    pub fn set_status(&self, status: PayloadValidationStatus) {
        *self.status.lock() = status;
    }

    /// Makes subsequent calls to [`ExecutionEngine::notify_new_payload`] fail.
    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock() = reachable;
    }

    #[must_use]
    pub fn notified_payloads(&self) -> Vec<(H256, ExecutionBlockHash)> {
        self.notified_payloads.lock().clone()
    }

    #[must_use]
    pub fn fork_choice_updates(&self) -> Vec<ForkChoiceStateV1> {
        self.fork_choice_updates.lock().clone()
    }
}

#[derive(Debug, Error)]
#[error("execution engine is not reachable")]
struct Error;

#[cfg(test)]
mod tests {
    use futures::{channel::oneshot, executor::block_on};

    use super::*;

    #[test]
    fn mock_engine_replies_with_configured_status() -> Result<()> {
        let engine = MockExecutionEngine::new(true);
        let payload = ExecutionPayload {
            block_hash: H256::repeat_byte(2),
            ..ExecutionPayload::default()
        };

        let (sender, receiver) = oneshot::channel();

        engine.notify_new_payload(H256::repeat_byte(1), payload.clone(), Some(sender))?;

        let response = block_on(receiver)??;

        assert_eq!(response.status, PayloadValidationStatus::Valid);
        assert_eq!(response.latest_valid_hash, Some(H256::repeat_byte(2)));

        engine.set_status(PayloadValidationStatus::Syncing);

        let (sender, receiver) = oneshot::channel();

        engine.notify_new_payload(H256::repeat_byte(3), payload, Some(sender))?;

        assert_eq!(block_on(receiver)??.status, PayloadValidationStatus::Syncing);
        assert_eq!(engine.notified_payloads().len(), 2);

        Ok(())
    }

    #[test]
    fn unreachable_mock_engine_returns_error() {
        let engine = MockExecutionEngine::new(true);

        engine.set_reachable(false);

        let result = engine.notify_new_payload(H256::zero(), ExecutionPayload::default(), None);

        assert!(result.is_err());
        assert!(engine.notified_payloads().is_empty());
    }

    #[test]
    fn null_engine_drops_sender() -> Result<()> {
        let (sender, receiver) = oneshot::channel();

        NullExecutionEngine.notify_new_payload(
            H256::zero(),
            ExecutionPayload::default(),
            Some(sender),
        )?;

        assert!(block_on(receiver).is_err());

        Ok(())
    }
}
