use thiserror::Error;
use types::phase0::primitives::{CommitteeIndex, Epoch, ValidatorIndex};

#[derive(Debug, Error)]
pub enum Error {
    #[error("attestation has no attesting indices")]
    AttestationHasNoAttestingIndices,
    #[error("attesting indices are not sorted and unique")]
    AttestingIndicesNotSortedAndUnique,
    #[error("committee index {index} is out of bounds")]
    CommitteeIndexOutOfBounds { index: CommitteeIndex },
    #[error(
        "aggregation bitlist length {aggregation_bitlist_length} \
         does not match committee length {committee_length}"
    )]
    CommitteeLengthMismatch {
        aggregation_bitlist_length: usize,
        committee_length: usize,
    },
    #[error("epoch {epoch} is not within one epoch of the state")]
    EpochOutOfRange { epoch: Epoch },
    #[error("no validators are active")]
    NoActiveValidators,
    #[error("slot is out of range")]
    SlotOutOfRange,
    #[error("validator {validator_index} is not in the registry")]
    ValidatorIndexOutOfBounds { validator_index: ValidatorIndex },
}
