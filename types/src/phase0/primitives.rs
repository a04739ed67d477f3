use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};

pub use ethereum_types::{H160, H256, H32};

pub type CommitteeIndex = u64;
pub type DepositIndex = u64;
pub type Epoch = u64;
pub type ExecutionAddress = H160;
pub type ExecutionBlockHash = H256;
pub type ExecutionBlockNumber = u64;
pub type Gwei = u64;
pub type Slot = u64;
pub type UnixSeconds = u64;
pub type ValidatorIndex = u64;
pub type Version = H32;

/// Serialized Dilithium public key.
///
/// The core never verifies signatures, so keys and signatures are carried as opaque bytes.
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Debug,
    Deref,
    From,
    Deserialize,
    Serialize,
)]
#[serde(transparent)]
pub struct PublicKeyBytes(#[serde(with = "hex::serde")] pub Vec<u8>);

/// Serialized Dilithium signature.
#[derive(Clone, PartialEq, Eq, Hash, Default, Debug, Deref, From, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SignatureBytes(#[serde(with = "hex::serde")] pub Vec<u8>);
