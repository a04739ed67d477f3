pub mod combined;

pub mod unphased {
    pub use block_processing::{
        validate_attestation, validate_attester_slashing, validate_proposer_slashing,
        validate_voluntary_exit,
    };
    pub use epoch_processing::process_justification_and_finalization;
    pub use error::Error;
    pub use slot_processing::{process_slot, process_slots, ProcessSlots};
    pub use state_transition::StateRootPolicy;

    pub(crate) use block_processing::{process_block_header, process_operations, validator};
    pub(crate) use epoch_processing::process_epoch;

    mod block_processing;
    mod epoch_processing;
    mod error;
    mod slot_processing;
    mod state_transition;
}

pub mod phase0 {
    pub(crate) use block_processing::process_block;
    pub(crate) use state_transition::state_transition;

    mod block_processing;
    mod state_transition;
}

pub mod capella {
    pub use block_processing::validate_bls_to_execution_change;

    pub(crate) use block_processing::process_block;
    pub(crate) use state_transition::state_transition;

    mod block_processing;
    mod state_transition;
}
