pub use crate::{
    attestation_pool::{AttestationBucket, AttestationPool},
    misc::{PoolAdditionOutcome, PoolRejectionReason},
    operation_pool::OperationPools,
};

mod attestation_pool;
mod misc;
mod operation_pool;
