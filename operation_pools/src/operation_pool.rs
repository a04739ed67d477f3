use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use parking_lot::RwLock;
use prometheus_metrics::Metrics;
use transition_functions::{capella, unphased};
use types::{
    capella::containers::SignedBlsToExecutionChange,
    combined::BeaconState,
    config::Config,
    phase0::{
        containers::{AttesterSlashing, ProposerSlashing, SignedVoluntaryExit},
        primitives::ValidatorIndex,
    },
    preset::Preset,
    traits::{BeaconBlockBody, BeaconState as _},
};

use crate::misc::{PoolAdditionOutcome, PoolRejectionReason};

/// Voluntary exits, slashings and execution-change messages waiting to be included in a block.
///
/// Operations are validated against the state passed to the `insert_*` methods. Operations
/// included in a block are only removed through [`OperationPools::mark_included`], which the
/// caller invokes for blocks that became the canonical head.
#[derive(Default)]
pub struct OperationPools {
    voluntary_exits: RwLock<HashMap<ValidatorIndex, SignedVoluntaryExit>>,
    proposer_slashings: RwLock<HashMap<ValidatorIndex, ProposerSlashing>>,
    attester_slashings: RwLock<HashSet<AttesterSlashing>>,
    bls_to_execution_changes: RwLock<HashMap<ValidatorIndex, SignedBlsToExecutionChange>>,
}

impl OperationPools {
    pub fn insert_voluntary_exit<P: Preset>(
        &self,
        config: &Config,
        state: &BeaconState,
        voluntary_exit: SignedVoluntaryExit,
    ) -> PoolAdditionOutcome {
        let validator_index = voluntary_exit.message.validator_index;

        if self.voluntary_exits.read().contains_key(&validator_index) {
            return PoolAdditionOutcome::Ignore;
        }

        if let Err(error) = unphased::validate_voluntary_exit::<P>(config, state, &voluntary_exit) {
            warn!("voluntary exit rejected (error: {error}, voluntary_exit: {voluntary_exit:?})");
            return PoolAdditionOutcome::Reject(PoolRejectionReason::InvalidVoluntaryExit, error);
        }

        self.voluntary_exits
            .write()
            .insert(validator_index, voluntary_exit);

        PoolAdditionOutcome::Accept
    }

    pub fn insert_proposer_slashing<P: Preset>(
        &self,
        state: &BeaconState,
        proposer_slashing: ProposerSlashing,
    ) -> PoolAdditionOutcome {
        let proposer_index = proposer_slashing.signed_header_1.message.proposer_index;

        if self.proposer_slashings.read().contains_key(&proposer_index) {
            return PoolAdditionOutcome::Ignore;
        }

        if let Err(error) = unphased::validate_proposer_slashing::<P>(state, &proposer_slashing) {
            warn!(
                "proposer slashing rejected \
                 (error: {error}, proposer_slashing: {proposer_slashing:?})",
            );

            return PoolAdditionOutcome::Reject(PoolRejectionReason::InvalidProposerSlashing, error);
        }

        self.proposer_slashings
            .write()
            .insert(proposer_index, proposer_slashing);

        PoolAdditionOutcome::Accept
    }

    pub fn insert_attester_slashing<P: Preset>(
        &self,
        state: &BeaconState,
        attester_slashing: AttesterSlashing,
    ) -> PoolAdditionOutcome {
        if self.attester_slashings.read().contains(&attester_slashing) {
            return PoolAdditionOutcome::Ignore;
        }

        if let Err(error) = unphased::validate_attester_slashing::<P>(state, &attester_slashing) {
            warn!(
                "attester slashing rejected \
                 (error: {error}, attester_slashing: {attester_slashing:?})",
            );

            return PoolAdditionOutcome::Reject(PoolRejectionReason::InvalidAttesterSlashing, error);
        }

        self.attester_slashings.write().insert(attester_slashing);

        PoolAdditionOutcome::Accept
    }

    pub fn insert_bls_to_execution_change(
        &self,
        state: &BeaconState,
        bls_to_execution_change: SignedBlsToExecutionChange,
    ) -> PoolAdditionOutcome {
        let Some(state) = state.post_capella() else {
            warn!(
                "signed BLS to execution change received before Capella fork \
                 (bls_to_execution_change: {bls_to_execution_change:?}, slot: {})",
                state.slot(),
            );

            return PoolAdditionOutcome::Ignore;
        };

        let validator_index = bls_to_execution_change.message.validator_index;

        if self
            .bls_to_execution_changes
            .read()
            .contains_key(&validator_index)
        {
            return PoolAdditionOutcome::Ignore;
        }

        if let Err(error) =
            capella::validate_bls_to_execution_change(state, &bls_to_execution_change)
        {
            warn!(
                "BLS to execution change rejected \
                 (error: {error}, bls_to_execution_change: {bls_to_execution_change:?})",
            );

            return PoolAdditionOutcome::Reject(
                PoolRejectionReason::InvalidBlsToExecutionChange,
                error,
            );
        }

        self.bls_to_execution_changes
            .write()
            .insert(validator_index, bls_to_execution_change);

        PoolAdditionOutcome::Accept
    }

    /// Removes operations included in a block.
    ///
    /// Returns the number of operations removed.
    pub fn mark_included(&self, body: &(impl BeaconBlockBody + ?Sized)) -> usize {
        let mut removed = 0;

        {
            let mut voluntary_exits = self.voluntary_exits.write();

            for voluntary_exit in body.voluntary_exits() {
                removed += usize::from(
                    voluntary_exits
                        .remove(&voluntary_exit.message.validator_index)
                        .is_some(),
                );
            }
        }

        {
            let mut proposer_slashings = self.proposer_slashings.write();

            for proposer_slashing in body.proposer_slashings() {
                let proposer_index = proposer_slashing.signed_header_1.message.proposer_index;
                removed += usize::from(proposer_slashings.remove(&proposer_index).is_some());
            }
        }

        {
            let mut attester_slashings = self.attester_slashings.write();

            for attester_slashing in body.attester_slashings() {
                removed += usize::from(attester_slashings.remove(attester_slashing));
            }
        }

        if let Some(body) = body.post_capella() {
            let mut bls_to_execution_changes = self.bls_to_execution_changes.write();

            for bls_to_execution_change in body.bls_to_execution_changes() {
                let validator_index = bls_to_execution_change.message.validator_index;
                removed += usize::from(bls_to_execution_changes.remove(&validator_index).is_some());
            }
        }

        if removed > 0 {
            debug!("removed {removed} operations included in a block from operation pools");
        }

        removed
    }

    #[must_use]
    pub fn voluntary_exits(&self) -> Vec<SignedVoluntaryExit> {
        self.voluntary_exits.read().values().cloned().collect()
    }

    #[must_use]
    pub fn proposer_slashings(&self) -> Vec<ProposerSlashing> {
        self.proposer_slashings.read().values().cloned().collect()
    }

    #[must_use]
    pub fn attester_slashings(&self) -> Vec<AttesterSlashing> {
        self.attester_slashings.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn bls_to_execution_changes(&self) -> Vec<SignedBlsToExecutionChange> {
        self.bls_to_execution_changes
            .read()
            .values()
            .cloned()
            .collect()
    }

    pub fn track_collection_metrics(&self, metrics: &Metrics) {
        let type_name = "OperationPools";

        metrics.set_collection_length(
            type_name,
            "voluntary_exits",
            self.voluntary_exits.read().len(),
        );

        metrics.set_collection_length(
            type_name,
            "proposer_slashings",
            self.proposer_slashings.read().len(),
        );

        metrics.set_collection_length(
            type_name,
            "attester_slashings",
            self.attester_slashings.read().len(),
        );

        metrics.set_collection_length(
            type_name,
            "bls_to_execution_changes",
            self.bls_to_execution_changes.read().len(),
        );
    }
}
