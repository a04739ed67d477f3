use anyhow::Result;
use helper_functions::misc;
use log::warn;
use serde::Serialize;
use strum::{AsRefStr, EnumString};
use tokio::sync::broadcast::{self, Receiver, Sender};
use types::{
    capella::containers::SignedBlsToExecutionChange,
    phase0::{
        containers::{AttesterSlashing, Checkpoint, ProposerSlashing, SignedVoluntaryExit},
        primitives::{Epoch, Slot, H256},
    },
    preset::Preset,
};

use crate::head::Head;

pub const DEFAULT_MAX_EVENTS: usize = 100;

#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Topic {
    AttesterSlashing,
    Block,
    BlsToExecutionChange,
    ChainReorg,
    FinalizedCheckpoint,
    Head,
    ProposerSlashing,
    VoluntaryExit,
}

#[derive(Clone, Debug)]
pub enum Event {
    AttesterSlashing(Box<AttesterSlashing>),
    Block(BlockEvent),
    BlsToExecutionChange(Box<SignedBlsToExecutionChange>),
    ChainReorg(ChainReorgEvent),
    FinalizedCheckpoint(FinalizedCheckpointEvent),
    Head(HeadEvent),
    ProposerSlashing(Box<ProposerSlashing>),
    VoluntaryExit(Box<SignedVoluntaryExit>),
}

impl Event {
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::AttesterSlashing(_) => Topic::AttesterSlashing,
            Self::Block(_) => Topic::Block,
            Self::BlsToExecutionChange(_) => Topic::BlsToExecutionChange,
            Self::ChainReorg(_) => Topic::ChainReorg,
            Self::FinalizedCheckpoint(_) => Topic::FinalizedCheckpoint,
            Self::Head(_) => Topic::Head,
            Self::ProposerSlashing(_) => Topic::ProposerSlashing,
            Self::VoluntaryExit(_) => Topic::VoluntaryExit,
        }
    }
}

/// Fan-out of fork choice events to subscribers.
///
/// Sending to a topic without subscribers does nothing. Send failures are logged.
#[derive(Clone, Debug)]
pub struct EventChannels {
    pub attester_slashings: Sender<Event>,
    pub blocks: Sender<Event>,
    pub bls_to_execution_changes: Sender<Event>,
    pub chain_reorgs: Sender<Event>,
    pub finalized_checkpoints: Sender<Event>,
    pub heads: Sender<Event>,
    pub proposer_slashings: Sender<Event>,
    pub voluntary_exits: Sender<Event>,
}

impl Default for EventChannels {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl EventChannels {
    /// Channels hold at least one event each.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        let max_events = max_events.max(1);

        Self {
            attester_slashings: broadcast::channel(max_events).0,
            blocks: broadcast::channel(max_events).0,
            bls_to_execution_changes: broadcast::channel(max_events).0,
            chain_reorgs: broadcast::channel(max_events).0,
            finalized_checkpoints: broadcast::channel(max_events).0,
            heads: broadcast::channel(max_events).0,
            proposer_slashings: broadcast::channel(max_events).0,
            voluntary_exits: broadcast::channel(max_events).0,
        }
    }

    #[must_use]
    pub fn receiver_for(&self, topic: Topic) -> Receiver<Event> {
        self.sender_for(topic).subscribe()
    }

    pub fn send_attester_slashing_event(&self, attester_slashing: AttesterSlashing) {
        let event = Event::AttesterSlashing(Box::new(attester_slashing));

        if let Err(error) = self.send(event) {
            warn!("unable to send attester slashing event: {error}");
        }
    }

    pub fn send_block_event(&self, slot: Slot, block_root: H256, execution_optimistic: bool) {
        let event = Event::Block(BlockEvent {
            slot,
            block: block_root,
            execution_optimistic,
        });

        if let Err(error) = self.send(event) {
            warn!("unable to send block event: {error}");
        }
    }

    pub fn send_bls_to_execution_change_event(
        &self,
        signed_bls_to_execution_change: SignedBlsToExecutionChange,
    ) {
        let event = Event::BlsToExecutionChange(Box::new(signed_bls_to_execution_change));

        if let Err(error) = self.send(event) {
            warn!("unable to send bls to execution change event: {error}");
        }
    }

    pub fn send_chain_reorg_event<P: Preset>(
        &self,
        old_head: &Head,
        new_head: &Head,
        common_ancestor_slot: Slot,
    ) {
        let event = Event::ChainReorg(ChainReorgEvent::new::<P>(
            old_head,
            new_head,
            common_ancestor_slot,
        ));

        if let Err(error) = self.send(event) {
            warn!("unable to send chain reorg event: {error}");
        }
    }

    pub fn send_finalized_checkpoint_event(
        &self,
        finalized_checkpoint: Checkpoint,
        execution_optimistic: bool,
    ) {
        let Checkpoint { epoch, root } = finalized_checkpoint;

        let event = Event::FinalizedCheckpoint(FinalizedCheckpointEvent {
            block: root,
            epoch,
            execution_optimistic,
        });

        if let Err(error) = self.send(event) {
            warn!("unable to send finalized checkpoint event: {error}");
        }
    }

    pub fn send_head_event<P: Preset>(&self, head: &Head) {
        let event = Event::Head(HeadEvent::new::<P>(head));

        if let Err(error) = self.send(event) {
            warn!("unable to send head event: {error}");
        }
    }

    pub fn send_proposer_slashing_event(&self, proposer_slashing: ProposerSlashing) {
        let event = Event::ProposerSlashing(Box::new(proposer_slashing));

        if let Err(error) = self.send(event) {
            warn!("unable to send proposer slashing event: {error}");
        }
    }

    pub fn send_voluntary_exit_event(&self, voluntary_exit: SignedVoluntaryExit) {
        let event = Event::VoluntaryExit(Box::new(voluntary_exit));

        if let Err(error) = self.send(event) {
            warn!("unable to send voluntary exit event: {error}");
        }
    }

    fn send(&self, event: Event) -> Result<()> {
        let sender = self.sender_for(event.topic());

        if sender.receiver_count() > 0 {
            sender.send(event)?;
        }

        Ok(())
    }

    const fn sender_for(&self, topic: Topic) -> &Sender<Event> {
        match topic {
            Topic::AttesterSlashing => &self.attester_slashings,
            Topic::Block => &self.blocks,
            Topic::BlsToExecutionChange => &self.bls_to_execution_changes,
            Topic::ChainReorg => &self.chain_reorgs,
            Topic::FinalizedCheckpoint => &self.finalized_checkpoints,
            Topic::Head => &self.heads,
            Topic::ProposerSlashing => &self.proposer_slashings,
            Topic::VoluntaryExit => &self.voluntary_exits,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct BlockEvent {
    pub slot: Slot,
    pub block: H256,
    pub execution_optimistic: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct ChainReorgEvent {
    pub slot: Slot,
    pub depth: u64,
    pub old_head_block: H256,
    pub new_head_block: H256,
    pub epoch: Epoch,
    pub execution_optimistic: bool,
}

impl ChainReorgEvent {
    // `depth` is the distance from the old head to the last block both chains share.
    fn new<P: Preset>(old_head: &Head, new_head: &Head, common_ancestor_slot: Slot) -> Self {
        let new_slot = new_head.slot();

        Self {
            slot: new_slot,
            depth: old_head.slot().abs_diff(common_ancestor_slot),
            old_head_block: old_head.block_root,
            new_head_block: new_head.block_root,
            epoch: misc::compute_epoch_at_slot::<P>(new_slot),
            execution_optimistic: new_head.is_optimistic,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct FinalizedCheckpointEvent {
    pub block: H256,
    pub epoch: Epoch,
    pub execution_optimistic: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct HeadEvent {
    pub slot: Slot,
    pub block: H256,
    pub epoch_transition: bool,
    pub execution_optimistic: bool,
}

impl HeadEvent {
    fn new<P: Preset>(head: &Head) -> Self {
        let slot = head.slot();

        Self {
            slot,
            block: head.block_root,
            epoch_transition: misc::is_epoch_start::<P>(slot),
            execution_optimistic: head.is_optimistic,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    #[test]
    fn events_are_delivered_to_subscribers_of_their_topic() {
        let event_channels = EventChannels::default();
        let mut blocks = event_channels.receiver_for(Topic::Block);
        let mut heads = event_channels.receiver_for(Topic::Head);

        event_channels.send_block_event(3, H256::repeat_byte(3), false);

        match blocks.try_recv() {
            Ok(Event::Block(event)) => {
                assert_eq!(event.slot, 3);
                assert_eq!(event.block, H256::repeat_byte(3));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(matches!(heads.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn sending_without_subscribers_does_nothing() {
        let event_channels = EventChannels::new(1);

        event_channels.send_finalized_checkpoint_event(Checkpoint::default(), false);
        event_channels.send_finalized_checkpoint_event(Checkpoint::default(), false);

        let mut receiver = event_channels.receiver_for(Topic::FinalizedCheckpoint);

        assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn zero_capacity_is_raised_to_one_event() {
        let event_channels = EventChannels::new(0);
        let mut blocks = event_channels.receiver_for(Topic::Block);

        event_channels.send_block_event(1, H256::repeat_byte(1), false);

        assert!(matches!(blocks.try_recv(), Ok(Event::Block(_))));
    }

    #[test]
    fn topics_parse_from_snake_case() {
        assert_eq!("chain_reorg".parse::<Topic>().ok(), Some(Topic::ChainReorg));
        assert_eq!(Topic::FinalizedCheckpoint.as_ref(), "finalized_checkpoint");
    }
}
