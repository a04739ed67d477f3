//! In-memory fork choice tree.
//!
//! Every block is a [`Node`] that records the checkpoints of its post-state, the status of its
//! execution payload and the total balance of latest messages voting for it or its descendants.
//! Weights are updated incrementally by propagating balance differences to ancestors.
//!
//! The head is found by walking down from the justified block, at each step choosing the
//! heaviest child that leads to a viable leaf. A leaf is viable if its checkpoints agree with the
//! checkpoints of the store and its payload is not invalid.
//!
//! Block and attestation processing is split into `validate_*` and `apply_*` methods.
//! The `validate_*` methods do not mutate [`Store`] and can run while the store is shared.
//!
//! Notes on nomenclature:
//! - Pruning means removing blocks that do not descend from the finalized block.
//! - A node is optimistic while its execution payload has not been validated.

pub use crate::{
    error::Error,
    misc::{ApplyBlockChanges, AttestationAction, LatestMessage, Node, ValidAttestation},
    store::Store,
    store_config::StoreConfig,
};

mod error;
mod misc;
mod store;
mod store_config;
