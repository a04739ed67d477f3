use core::ops::Range;

use typenum::Unsigned as _;
use types::{
    config::Config,
    hashing,
    phase0::{
        consts::BLS_WITHDRAWAL_PREFIX,
        primitives::{Epoch, PublicKeyBytes, Slot, UnixSeconds, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot / P::SlotsPerEpoch::U64
}

#[must_use]
pub const fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SlotsPerEpoch::U64)
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot - compute_start_slot_at_epoch::<P>(compute_epoch_at_slot::<P>(slot))
}

#[must_use]
pub const fn slots_in_epoch<P: Preset>(epoch: Epoch) -> Range<Slot> {
    compute_start_slot_at_epoch::<P>(epoch)..compute_start_slot_at_epoch::<P>(epoch + 1)
}

#[must_use]
pub const fn compute_activation_exit_epoch<P: Preset>(epoch: Epoch) -> Epoch {
    epoch + 1 + P::MAX_SEED_LOOKAHEAD
}

#[must_use]
pub fn committee_count_from_active_validator_count<P: Preset>(active_validator_count: u64) -> u64 {
    (active_validator_count / P::SlotsPerEpoch::U64 / P::TARGET_COMMITTEE_SIZE)
        .clamp(1, P::MAX_COMMITTEES_PER_SLOT.get())
}

#[must_use]
pub fn compute_timestamp_at_slot(
    config: &Config,
    state: &impl BeaconState,
    slot: Slot,
) -> UnixSeconds {
    state.genesis_time() + slot * config.seconds_per_slot.get()
}

/// Withdrawal credentials committing to a BLS public key.
#[must_use]
pub fn bls_withdrawal_credentials(public_key: &PublicKeyBytes) -> H256 {
    let mut credentials = hashing::digest(public_key);
    credentials.as_bytes_mut()[..BLS_WITHDRAWAL_PREFIX.len()]
        .copy_from_slice(BLS_WITHDRAWAL_PREFIX);
    credentials
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::preset::{Mainnet, Minimal};

    use super::*;

    #[test]
    fn test_epoch_at_slot() {
        assert_eq!(compute_epoch_at_slot::<Minimal>(9), 1);
        assert_eq!(compute_epoch_at_slot::<Minimal>(8), 1);
        assert_eq!(compute_epoch_at_slot::<Minimal>(7), 0);
    }

    #[test]
    fn test_start_slot_at_epoch() {
        assert_eq!(compute_start_slot_at_epoch::<Minimal>(1), 8);
        assert_eq!(compute_start_slot_at_epoch::<Minimal>(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_activation_exit_epoch() {
        assert_eq!(compute_activation_exit_epoch::<Minimal>(1), 6);
    }

    #[test]
    fn test_slots_in_epoch() {
        assert_eq!(slots_in_epoch::<Minimal>(2), 16..24);
        assert!(is_epoch_start::<Minimal>(16));
        assert!(!is_epoch_start::<Minimal>(17));
    }

    #[test_case(0, 1)]
    #[test_case(64, 2)]
    #[test_case(1024, 4)]
    fn committee_count_is_clamped_for_minimal(active_validator_count: u64, expected: u64) {
        assert_eq!(
            committee_count_from_active_validator_count::<Minimal>(active_validator_count),
            expected,
        );
    }

    #[test]
    fn timestamp_counts_slots_from_genesis() {
        let state = types::phase0::beacon_state::BeaconState {
            genesis_time: 1_000,
            ..Default::default()
        };

        assert_eq!(compute_timestamp_at_slot(&Config::minimal(), &state, 10), 1_060);
    }

    #[test]
    fn committee_count_for_mainnet_sized_registry() {
        assert_eq!(
            committee_count_from_active_validator_count::<Mainnet>(1 << 20),
            64,
        );
    }
}
