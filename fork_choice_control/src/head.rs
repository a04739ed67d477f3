use std::sync::Arc;

use parking_lot::RwLock;
use std_ext::ArcExt as _;
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    phase0::primitives::{Slot, H256},
    traits::SignedBeaconBlock as _,
};

/// The canonical head along with its post-state.
#[derive(Clone, Debug)]
pub struct Head {
    pub block_root: H256,
    pub block: Arc<SignedBeaconBlock>,
    pub state: Arc<BeaconState>,
    pub is_optimistic: bool,
}

impl Head {
    #[must_use]
    pub fn slot(&self) -> Slot {
        self.block.slot()
    }
}

/// Shared handle to the current [`Head`].
///
/// Has its own lock, separate from the lock over the fork choice store.
/// Any number of readers may hold the lock at once. Writers exclude readers.
pub struct HeadHandle {
    head: RwLock<Head>,
}

impl HeadHandle {
    #[must_use]
    pub const fn new(head: Head) -> Self {
        Self {
            head: RwLock::new(head),
        }
    }

    #[must_use]
    pub fn get(&self) -> Head {
        self.head.read().clone()
    }

    #[must_use]
    pub fn block_root(&self) -> H256 {
        self.head.read().block_root
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        self.head.read().slot()
    }

    #[must_use]
    pub fn state(&self) -> Arc<BeaconState> {
        self.head.read().state.clone_arc()
    }

    /// Replaces the head and returns the previous one.
    pub(crate) fn replace(&self, head: Head) -> Head {
        core::mem::replace(&mut *self.head.write(), head)
    }

    pub(crate) fn set_optimistic(&self, block_root: H256, is_optimistic: bool) {
        let mut head = self.head.write();

        if head.block_root == block_root {
            head.is_optimistic = is_optimistic;
        }
    }
}
