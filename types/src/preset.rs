use core::{fmt::Debug, hash::Hash, num::NonZeroU64};

use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use typenum::{NonZero, Unsigned, U128, U16, U2, U2048, U32, U512, U64, U8, U8192};

use crate::{config::Config, phase0::primitives::Gwei};

/// Compile-time configuration variables.
///
/// Only the variables used by the fork choice core and the state transition it drives are
/// included. Values follow the consensus-specs presets.
pub trait Preset: Copy + Eq + Ord + Hash + Default + Debug + Send + Sync + 'static {
    type MaxAttestations: Unsigned;
    type MaxAttesterSlashings: Unsigned;
    type MaxBlsToExecutionChanges: Unsigned;
    type MaxDeposits: Unsigned;
    type MaxProposerSlashings: Unsigned;
    type MaxValidatorsPerCommittee: Unsigned + NonZero;
    type MaxVoluntaryExits: Unsigned;
    type SlotsPerEpoch: Unsigned + NonZero;
    type SlotsPerHistoricalRoot: Unsigned + NonZero;
    type SyncCommitteeSize: Unsigned + NonZero;

    // Meta
    const NAME: PresetName;

    const EFFECTIVE_BALANCE_INCREMENT: NonZeroU64 = nonzero!(1_000_000_000_u64);
    const EPOCHS_PER_SLASHINGS_VECTOR: u64 = 8192;
    const MAX_COMMITTEES_PER_SLOT: NonZeroU64 = nonzero!(64_u64);
    const MAX_EFFECTIVE_BALANCE: Gwei = 32_000_000_000;
    const MAX_SEED_LOOKAHEAD: u64 = 4;
    const MIN_ATTESTATION_INCLUSION_DELAY: NonZeroU64 = NonZeroU64::MIN;
    const MIN_SLASHING_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(128_u64);
    const MIN_VALIDATOR_WITHDRAWABILITY_DELAY: u64 = 256;
    const PROPOSER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(8_u64);
    const TARGET_COMMITTEE_SIZE: NonZeroU64 = nonzero!(128_u64);
    const WHISTLEBLOWER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(512_u64);

    /// Returns the default configuration associated with a preset.
    ///
    /// This should only be used in tests.
    #[must_use]
    fn default_config() -> Config {
        Self::NAME.default_config()
    }
}

/// [Mainnet preset](https://github.com/ethereum/consensus-specs/tree/dev/presets/mainnet).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Mainnet;

impl Preset for Mainnet {
    type MaxAttestations = U128;
    type MaxAttesterSlashings = U2;
    type MaxBlsToExecutionChanges = U16;
    type MaxDeposits = U16;
    type MaxProposerSlashings = U16;
    type MaxValidatorsPerCommittee = U2048;
    type MaxVoluntaryExits = U16;
    type SlotsPerEpoch = U32;
    type SlotsPerHistoricalRoot = U8192;
    type SyncCommitteeSize = U512;

    const NAME: PresetName = PresetName::Mainnet;
}

macro_rules! delegate_preset_items {
    (
        super $base_preset: ident;
        $(type $associated_type: ident;)*
    ) => {
        $(type $associated_type = <$base_preset as Preset>::$associated_type;)*
    };
}

/// [Minimal preset](https://github.com/ethereum/consensus-specs/tree/dev/presets/minimal).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Minimal;

impl Preset for Minimal {
    delegate_preset_items! {
        super Mainnet;

        type MaxAttestations;
        type MaxAttesterSlashings;
        type MaxBlsToExecutionChanges;
        type MaxDeposits;
        type MaxProposerSlashings;
        type MaxValidatorsPerCommittee;
        type MaxVoluntaryExits;
    }

    type SlotsPerEpoch = U8;
    type SlotsPerHistoricalRoot = U64;
    type SyncCommitteeSize = U32;

    const NAME: PresetName = PresetName::Minimal;

    const EPOCHS_PER_SLASHINGS_VECTOR: u64 = 64;
    const TARGET_COMMITTEE_SIZE: NonZeroU64 = nonzero!(4_u64);
    const MAX_COMMITTEES_PER_SLOT: NonZeroU64 = nonzero!(4_u64);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString, Deserialize, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    Mainnet,
    Minimal,
}

impl PresetName {
    #[must_use]
    pub fn default_config(self) -> Config {
        match self {
            Self::Mainnet => Config::mainnet(),
            Self::Minimal => Config::minimal(),
        }
    }

    #[must_use]
    pub const fn slots_per_epoch(self) -> u64 {
        match self {
            Self::Mainnet => <<Mainnet as Preset>::SlotsPerEpoch as Unsigned>::U64,
            Self::Minimal => <<Minimal as Preset>::SlotsPerEpoch as Unsigned>::U64,
        }
    }
}

#[cfg(test)]
mod tests {
    use core::str::FromStr as _;

    use test_case::test_case;

    use super::*;

    #[test_case(PresetName::Mainnet, 32)]
    #[test_case(PresetName::Minimal, 8)]
    fn preset_name_reports_slots_per_epoch(name: PresetName, expected: u64) {
        assert_eq!(name.slots_per_epoch(), expected);
    }

    #[test]
    fn preset_name_parses_lowercase() -> Result<(), strum::ParseError> {
        assert_eq!(PresetName::from_str("minimal")?, PresetName::Minimal);
        assert_eq!(PresetName::Minimal.to_string(), "minimal");
        Ok(())
    }
}
