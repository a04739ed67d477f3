//! Attestations received from gossip, the API, or blocks.
//!
//! The pool keeps four buckets:
//! - unaggregated attestations with a single participant,
//! - aggregated attestations,
//! - attestations included in blocks,
//! - attestations waiting to be applied to fork choice.
//!
//! Buckets are independently locked. Draining the forkchoice-pending bucket into fork choice is
//! coordinated by the caller.

use std::collections::HashMap;

use anyhow::{ensure, Result};
use helper_functions::misc;
use log::debug;
use parking_lot::RwLock;
use prometheus_metrics::Metrics;
use strum::{AsRefStr, EnumIter, IntoEnumIterator as _};
use thiserror::Error;
use types::{
    hashing,
    phase0::{
        containers::{AggregationBits, Attestation, AttestationData},
        primitives::{Epoch, Slot, H256},
    },
    preset::Preset,
};

type AttestationMap = HashMap<AttestationData, Vec<Attestation>>;

#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum AttestationBucket {
    Unaggregated,
    Aggregated,
    BlockIncluded,
    ForkchoicePending,
}

#[derive(Default)]
pub struct AttestationPool {
    unaggregated: RwLock<AttestationMap>,
    aggregated: RwLock<AttestationMap>,
    block_included: RwLock<AttestationMap>,
    // Keyed by attestation root so that the same attestation received twice is applied once.
    forkchoice_pending: RwLock<HashMap<H256, Attestation>>,
}

impl AttestationPool {
    /// Returns `false` if the attestation was already in the pool.
    pub fn save_unaggregated(&self, attestation: Attestation) -> Result<bool> {
        ensure!(
            attestation.is_single(),
            Error::NotUnaggregated {
                participants: attestation.participant_count(),
            },
        );

        Ok(insert_unique(&mut self.unaggregated.write(), attestation))
    }

    /// Returns `false` if the participants of `attestation` are already covered by another
    /// aggregate or by an attestation included in a block.
    pub fn save_aggregated(&self, attestation: Attestation) -> Result<bool> {
        ensure!(attestation.participant_count() > 0, Error::NoParticipants);

        if is_covered(&self.block_included.read(), &attestation) {
            return Ok(false);
        }

        let mut aggregated = self.aggregated.write();
        let aggregates = aggregated.entry(attestation.data).or_default();

        let new_bits = &attestation.aggregation_bits;

        if aggregates
            .iter()
            .any(|aggregate| is_superset(&aggregate.aggregation_bits, new_bits))
        {
            return Ok(false);
        }

        aggregates.retain(|aggregate| !is_superset(new_bits, &aggregate.aggregation_bits));

        aggregates.push(attestation);

        Ok(true)
    }

    pub fn save_block_attestation(&self, attestation: Attestation) -> bool {
        insert_unique(&mut self.block_included.write(), attestation)
    }

    pub fn save_forkchoice_attestation(&self, attestation: Attestation) -> bool {
        self.forkchoice_pending
            .write()
            .insert(hashing::digest(&attestation), attestation)
            .is_none()
    }

    #[must_use]
    pub fn unaggregated_attestations(&self) -> Vec<Attestation> {
        flatten(&self.unaggregated.read())
    }

    #[must_use]
    pub fn aggregated_attestations(&self) -> Vec<Attestation> {
        flatten(&self.aggregated.read())
    }

    #[must_use]
    pub fn block_attestations(&self) -> Vec<Attestation> {
        flatten(&self.block_included.read())
    }

    /// Snapshot of the forkchoice-pending bucket.
    ///
    /// Attestations stay in the bucket until removed with
    /// [`AttestationPool::remove_forkchoice_attestations`].
    #[must_use]
    pub fn forkchoice_attestations(&self) -> Vec<Attestation> {
        self.forkchoice_pending.read().values().cloned().collect()
    }

    pub fn remove_forkchoice_attestations<'attestation>(
        &self,
        attestations: impl IntoIterator<Item = &'attestation Attestation>,
    ) -> usize {
        let mut forkchoice_pending = self.forkchoice_pending.write();

        attestations
            .into_iter()
            .filter(|attestation| {
                forkchoice_pending
                    .remove(&hashing::digest(*attestation))
                    .is_some()
            })
            .count()
    }

    #[must_use]
    pub fn count(&self, bucket: AttestationBucket) -> usize {
        let count_values = |map: &AttestationMap| -> usize { map.values().map(Vec::len).sum() };

        match bucket {
            AttestationBucket::Unaggregated => count_values(&self.unaggregated.read()),
            AttestationBucket::Aggregated => count_values(&self.aggregated.read()),
            AttestationBucket::BlockIncluded => count_values(&self.block_included.read()),
            AttestationBucket::ForkchoicePending => self.forkchoice_pending.read().len(),
        }
    }

    /// Merges unaggregated attestations with equal data into the aggregated bucket.
    ///
    /// Attestations that have no partner to be merged with stay unaggregated.
    /// Returns the number of unaggregated attestations consumed.
    pub fn aggregate(&self) -> Result<usize> {
        let mut unaggregated = self.unaggregated.write();
        let mut consumed = 0;

        for attestations in unaggregated.values_mut() {
            if attestations.len() < 2 {
                continue;
            }

            let mut aggregate = attestations[0].clone();
            let mut merged = 1;

            for attestation in &attestations[1..] {
                if let Some(merged_attestation) = merge_disjoint(&aggregate, attestation) {
                    aggregate = merged_attestation;
                    merged += 1;
                }
            }

            debug!(
                "aggregated {merged} attestations (slot: {}, index: {}, beacon_block_root: {:?})",
                aggregate.data.slot, aggregate.data.index, aggregate.data.beacon_block_root,
            );

            self.save_aggregated(aggregate)?;

            consumed += attestations.len();
            attestations.clear();
        }

        unaggregated.retain(|_, attestations| !attestations.is_empty());

        Ok(consumed)
    }

    /// Removes attestations that are more than one epoch old from all buckets except the
    /// forkchoice-pending one.
    pub fn prune_expired<P: Preset>(&self, current_slot: Slot) {
        let slots_per_epoch = misc::compute_start_slot_at_epoch::<P>(1);
        let is_live = |data: &AttestationData| data.slot + slots_per_epoch >= current_slot;

        self.unaggregated.write().retain(|data, _| is_live(data));
        self.aggregated.write().retain(|data, _| is_live(data));
        self.block_included.write().retain(|data, _| is_live(data));
    }

    /// Removes attestations targeting epochs before `finalized_epoch` from all buckets.
    pub fn prune_finalized(&self, finalized_epoch: Epoch) {
        let is_live = |data: &AttestationData| data.target.epoch >= finalized_epoch;

        self.unaggregated.write().retain(|data, _| is_live(data));
        self.aggregated.write().retain(|data, _| is_live(data));
        self.block_included.write().retain(|data, _| is_live(data));

        self.forkchoice_pending
            .write()
            .retain(|_, attestation| is_live(&attestation.data));
    }

    pub fn track_collection_metrics(&self, metrics: &Metrics) {
        for bucket in AttestationBucket::iter() {
            metrics.set_collection_length("AttestationPool", bucket.as_ref(), self.count(bucket));
        }
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("unaggregated attestation has {participants} participants")]
    NotUnaggregated { participants: usize },
    #[error("attestation has no participants")]
    NoParticipants,
}

fn insert_unique(map: &mut AttestationMap, attestation: Attestation) -> bool {
    let attestations = map.entry(attestation.data).or_default();

    if attestations.contains(&attestation) {
        return false;
    }

    attestations.push(attestation);

    true
}

fn flatten(map: &AttestationMap) -> Vec<Attestation> {
    map.values().flatten().cloned().collect()
}

fn is_covered(map: &AttestationMap, attestation: &Attestation) -> bool {
    map.get(&attestation.data).is_some_and(|attestations| {
        attestations
            .iter()
            .any(|other| is_superset(&other.aggregation_bits, &attestation.aggregation_bits))
    })
}

fn is_superset(bits: &AggregationBits, subset: &AggregationBits) -> bool {
    bits.len() == subset.len() && subset.iter_ones().all(|index| bits[index])
}

// Signatures are ordered by participant position in the committee.
fn merge_disjoint(left: &Attestation, right: &Attestation) -> Option<Attestation> {
    if left.data != right.data || left.aggregation_bits.len() != right.aggregation_bits.len() {
        return None;
    }

    if right
        .aggregation_bits
        .iter_ones()
        .any(|index| left.aggregation_bits[index])
    {
        return None;
    }

    let mut left_signatures = left.signatures.iter();
    let mut right_signatures = right.signatures.iter();

    let pairs = || {
        left.aggregation_bits
            .iter()
            .by_vals()
            .zip(right.aggregation_bits.iter().by_vals())
    };

    let aggregation_bits = pairs()
        .map(|(in_left, in_right)| in_left || in_right)
        .collect();

    let signatures = pairs()
        .filter_map(|(in_left, in_right)| {
            if in_left {
                left_signatures.next()
            } else if in_right {
                right_signatures.next()
            } else {
                None
            }
        })
        .cloned()
        .collect();

    Some(Attestation {
        aggregation_bits,
        data: left.data,
        signatures,
    })
}

#[cfg(test)]
mod tests {
    use bitvec::{bitvec, order::Lsb0};
    use test_case::test_case;
    use types::{
        phase0::{containers::Checkpoint, primitives::SignatureBytes},
        preset::Minimal,
    };

    use super::*;

    #[test]
    fn unaggregated_attestations_must_have_one_participant() -> Result<()> {
        let pool = AttestationPool::default();

        assert!(pool.save_unaggregated(attestation(1, &[0]))?);
        assert!(!pool.save_unaggregated(attestation(1, &[0]))?);
        assert!(pool.save_unaggregated(attestation(1, &[0, 1])).is_err());
        assert_eq!(pool.count(AttestationBucket::Unaggregated), 1);

        Ok(())
    }

    #[test]
    fn aggregate_merges_attestations_with_equal_data() -> Result<()> {
        let pool = AttestationPool::default();

        pool.save_unaggregated(attestation(1, &[0]))?;
        pool.save_unaggregated(attestation(1, &[2]))?;
        pool.save_unaggregated(attestation(1, &[3]))?;
        pool.save_unaggregated(attestation(2, &[1]))?;

        assert_eq!(pool.aggregate()?, 3);

        let aggregated = pool.aggregated_attestations();

        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].aggregation_bits, bitvec![u8, Lsb0; 1, 0, 1, 1]);
        assert_eq!(
            aggregated[0].signatures,
            [signature(0), signature(2), signature(3)],
        );
        assert_eq!(pool.unaggregated_attestations(), [attestation(2, &[1])]);

        Ok(())
    }

    #[test]
    fn aggregated_subsets_are_ignored_and_supersets_replace() -> Result<()> {
        let pool = AttestationPool::default();

        assert!(pool.save_aggregated(attestation(1, &[0, 1]))?);
        assert!(!pool.save_aggregated(attestation(1, &[1]))?);
        assert!(pool.save_aggregated(attestation(1, &[0, 1, 2]))?);
        assert!(pool.save_aggregated(attestation(1, &[3]))?);

        assert_eq!(pool.count(AttestationBucket::Aggregated), 2);

        Ok(())
    }

    #[test]
    fn aggregated_attestations_covered_by_blocks_are_ignored() -> Result<()> {
        let pool = AttestationPool::default();

        assert!(pool.save_block_attestation(attestation(1, &[0, 1, 2])));
        assert!(!pool.save_block_attestation(attestation(1, &[0, 1, 2])));
        assert!(!pool.save_aggregated(attestation(1, &[0, 2]))?);
        assert!(pool.save_aggregated(attestation(1, &[3]))?);

        Ok(())
    }

    #[test]
    fn forkchoice_attestations_are_removed_only_when_requested() {
        let pool = AttestationPool::default();
        let first = attestation(1, &[0]);
        let second = attestation(1, &[1]);

        assert!(pool.save_forkchoice_attestation(first.clone()));
        assert!(!pool.save_forkchoice_attestation(first.clone()));
        assert!(pool.save_forkchoice_attestation(second));

        assert_eq!(pool.forkchoice_attestations().len(), 2);
        assert_eq!(pool.remove_forkchoice_attestations([&first, &first]), 1);
        assert_eq!(pool.count(AttestationBucket::ForkchoicePending), 1);
    }

    #[test_case(9, 1; "within one epoch")]
    #[test_case(10, 0; "more than one epoch later")]
    fn prune_expired_uses_one_epoch_window(current_slot: Slot, expected_count: usize) {
        let pool = AttestationPool::default();

        pool.save_block_attestation(attestation(1, &[0]));
        pool.prune_expired::<Minimal>(current_slot);

        assert_eq!(pool.count(AttestationBucket::BlockIncluded), expected_count);
    }

    #[test]
    fn prune_finalized_clears_all_buckets() -> Result<()> {
        let pool = AttestationPool::default();
        let old = with_target_epoch(attestation(1, &[0]), 1);
        let new = with_target_epoch(attestation(1, &[1]), 2);

        pool.save_unaggregated(old.clone())?;
        pool.save_forkchoice_attestation(old);
        pool.save_forkchoice_attestation(new.clone());

        pool.prune_finalized(2);

        assert_eq!(pool.count(AttestationBucket::Unaggregated), 0);
        assert_eq!(pool.forkchoice_attestations(), [new]);

        Ok(())
    }

    fn attestation(slot: Slot, participants: &[usize]) -> Attestation {
        let mut aggregation_bits = bitvec![u8, Lsb0; 0; 4];

        for participant in participants {
            aggregation_bits.set(*participant, true);
        }

        Attestation {
            aggregation_bits,
            data: AttestationData {
                slot,
                beacon_block_root: H256::repeat_byte(1),
                ..AttestationData::default()
            },
            signatures: participants.iter().copied().map(signature).collect(),
        }
    }

    fn with_target_epoch(mut attestation: Attestation, epoch: Epoch) -> Attestation {
        attestation.data.target = Checkpoint {
            epoch,
            root: H256::repeat_byte(2),
        };
        attestation
    }

    fn signature(participant: usize) -> SignatureBytes {
        vec![u8::try_from(participant).unwrap_or(u8::MAX)].into()
    }
}
