//! Block receipt and fork choice control.
//!
//! This crate handles the following concerns:
//! - Validating blocks and running the state transition outside the [store lock](`StoreLock`).
//! - Checking execution payloads and tracking optimistic blocks.
//! - Committing blocks one at a time or in batches from initial sync.
//! - Applying attestations and attester slashings to fork choice.
//! - [Persistence](`Storage`) and [state regeneration](`StateGenerator`).
//! - Notifying other components of the application about changes to the fork choice store.
//! - Pruning data made obsolete by finalization.
//! - [Waiting for background tasks](`Controller::wait_for_tasks`).

pub use crate::{
    block_processor::BlockProcessor,
    controller::Controller,
    controller_config::ControllerConfig,
    error::{ErrorKind, ReceiveBlockError},
    events::{
        BlockEvent, ChainReorgEvent, Event, EventChannels, FinalizedCheckpointEvent, HeadEvent,
        Topic, DEFAULT_MAX_EVENTS,
    },
    head::{Head, HeadHandle},
    messages::SlasherMessage,
    state_generator::StateGenerator,
    storage::{DatabaseStorage, Storage},
    store_lock::{StoreGuard, StoreLock},
    tasks::{DepositFinalizer, NullDepositFinalizer},
    unbounded_sink::UnboundedSink,
    weak_subjectivity::WeakSubjectivityVerifier,
};

mod block_processor;
mod controller;
mod controller_config;
mod error;
mod events;
mod head;
mod messages;
mod misc;
mod queries;
mod state_generator;
mod storage;
mod store_lock;
mod tasks;
mod unbounded_sink;
mod weak_subjectivity;

#[cfg(test)]
mod helpers;
