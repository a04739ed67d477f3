//! Content digests used as block and state roots.
//!
//! Roots are SHA-256 digests of the [`Hash`] encoding of a value. They are stable for the lifetime
//! of a process and across processes built for the same target, which is all the fork choice core
//! and its in-memory storage rely on.

use core::hash::{Hash, Hasher};

use sha2::{Digest as _, Sha256};

use crate::phase0::primitives::H256;

pub trait HashTreeRoot {
    fn hash_tree_root(&self) -> H256;
}

#[must_use]
pub fn digest(value: &(impl Hash + ?Sized)) -> H256 {
    let mut hasher = DigestHasher(Sha256::new());
    value.hash(&mut hasher);
    H256(hasher.0.finalize().into())
}

#[must_use]
pub fn hash_256_256(left: H256, right: H256) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    H256(hasher.finalize().into())
}

struct DigestHasher(Sha256);

impl Hasher for DigestHasher {
    // Only the bytes written matter. `finish` exists to satisfy `Hasher`.
    fn finish(&self) -> u64 {
        0
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
}

macro_rules! impl_hash_tree_root_by_digest {
    ($($container: ty),* $(,)?) => {
        $(
            impl $crate::hashing::HashTreeRoot for $container {
                fn hash_tree_root(&self) -> $crate::phase0::primitives::H256 {
                    $crate::hashing::digest(self)
                }
            }
        )*
    };
}

pub(crate) use impl_hash_tree_root_by_digest;

#[cfg(test)]
mod tests {
    use crate::phase0::containers::Checkpoint;

    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let checkpoint = Checkpoint {
            epoch: 3,
            root: H256::repeat_byte(7),
        };

        assert_eq!(checkpoint.hash_tree_root(), checkpoint.hash_tree_root());
    }

    #[test]
    fn digest_distinguishes_field_values() {
        let checkpoint_1 = Checkpoint {
            epoch: 3,
            root: H256::repeat_byte(7),
        };

        let checkpoint_2 = Checkpoint {
            epoch: 4,
            ..checkpoint_1
        };

        assert_ne!(checkpoint_1.hash_tree_root(), checkpoint_2.hash_tree_root());
    }

    #[test]
    fn hash_256_256_depends_on_order() {
        let left = H256::repeat_byte(1);
        let right = H256::repeat_byte(2);

        assert_ne!(hash_256_256(left, right), hash_256_256(right, left));
    }
}
