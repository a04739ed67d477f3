use core::num::NonZeroU64;
use std::borrow::Cow;

use hex_literal::hex;
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use typenum::Unsigned as _;

use crate::{
    nonstandard::Phase,
    phase0::{
        consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH},
        primitives::{Epoch, Gwei, Slot, UnixSeconds, Version, H32},
    },
    preset::{Preset, PresetName},
};

/// Configuration variables customizable at runtime.
///
/// Deserializes from the YAML format used by consensus-specs configurations.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Genesis
    pub genesis_fork_version: Version,
    pub min_genesis_active_validator_count: NonZeroU64,
    pub min_genesis_time: UnixSeconds,

    // Forking
    pub capella_fork_epoch: Epoch,
    pub capella_fork_version: Version,

    // Time parameters
    pub seconds_per_slot: NonZeroU64,
    pub shard_committee_period: u64,

    // Validator cycle
    pub churn_limit_quotient: NonZeroU64,
    pub ejection_balance: Gwei,
    pub min_per_epoch_churn_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Use `default` as the default `config_name` and override it in `Config::mainnet`.
            // This way custom network data will be kept separate from mainnet data if a user
            // forgets to specify a custom `CONFIG_NAME`.
            config_name: Cow::Borrowed("default"),
            preset_base: PresetName::Mainnet,

            // Genesis
            genesis_fork_version: H32(hex!("00000000")),
            min_genesis_active_validator_count: nonzero!(1_u64 << 14),
            min_genesis_time: 0,

            // Forking
            capella_fork_epoch: FAR_FUTURE_EPOCH,
            capella_fork_version: H32(hex!("03000000")),

            // Time parameters
            seconds_per_slot: nonzero!(60_u64),
            shard_committee_period: 256,

            // Validator cycle
            churn_limit_quotient: nonzero!(1_u64 << 16),
            ejection_balance: 16_000_000_000,
            min_per_epoch_churn_limit: 4,
        }
    }
}

impl Config {
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            min_genesis_time: 1_707_235_200,
            capella_fork_epoch: GENESIS_EPOCH,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn minimal() -> Self {
        Self {
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,
            genesis_fork_version: H32(hex!("00000001")),
            min_genesis_active_validator_count: nonzero!(64_u64),
            capella_fork_epoch: GENESIS_EPOCH,
            capella_fork_version: H32(hex!("03000001")),
            seconds_per_slot: nonzero!(6_u64),
            shard_committee_period: 64,
            churn_limit_quotient: nonzero!(32_u64),
            min_per_epoch_churn_limit: 2,
            ..Self::default()
        }
    }

    /// Returns [`Config::minimal`] with Capella scheduled at `capella_fork_epoch`.
    ///
    /// Useful for exercising the Phase 0 to Capella upgrade in tests.
    #[must_use]
    pub fn minimal_with_capella_at(capella_fork_epoch: Epoch) -> Self {
        Self {
            capella_fork_epoch,
            ..Self::minimal()
        }
    }

    #[must_use]
    pub const fn fork_epoch(&self, phase: Phase) -> Epoch {
        match phase {
            Phase::Phase0 => GENESIS_EPOCH,
            Phase::Capella => self.capella_fork_epoch,
        }
    }

    #[must_use]
    pub fn fork_slot<P: Preset>(&self, phase: Phase) -> Option<Slot> {
        self.fork_epoch(phase).checked_mul(P::SlotsPerEpoch::U64)
    }

    #[must_use]
    pub const fn phase_at_epoch(&self, epoch: Epoch) -> Phase {
        if epoch >= self.capella_fork_epoch {
            Phase::Capella
        } else {
            Phase::Phase0
        }
    }

    #[must_use]
    pub fn phase_at_slot<P: Preset>(&self, slot: Slot) -> Phase {
        match self.fork_slot::<P>(Phase::Capella) {
            Some(fork_slot) if fork_slot <= slot => Phase::Capella,
            _ => Phase::Phase0,
        }
    }

    #[must_use]
    pub const fn version(&self, phase: Phase) -> Version {
        match phase {
            Phase::Phase0 => self.genesis_fork_version,
            Phase::Capella => self.capella_fork_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::preset::Minimal;

    use super::*;

    #[test]
    fn config_deserializes_from_yaml_with_defaults() -> Result<(), serde_yaml::Error> {
        let yaml = concat!(
            "CONFIG_NAME: zond-testnet\n",
            "PRESET_BASE: minimal\n",
            "CAPELLA_FORK_EPOCH: 2\n",
            "CAPELLA_FORK_VERSION: '0x03000002'\n",
            "SECONDS_PER_SLOT: 12\n",
        );

        let config = serde_yaml::from_str::<Config>(yaml)?;

        assert_eq!(config.config_name, "zond-testnet");
        assert_eq!(config.preset_base, PresetName::Minimal);
        assert_eq!(config.capella_fork_epoch, 2);
        assert_eq!(config.capella_fork_version, H32(hex!("03000002")));
        assert_eq!(config.seconds_per_slot.get(), 12);
        assert_eq!(config.genesis_fork_version, Config::default().genesis_fork_version);

        Ok(())
    }

    #[test]
    fn phase_at_slot_switches_at_fork_slot() {
        let config = Config::minimal_with_capella_at(2);

        assert_eq!(config.phase_at_slot::<Minimal>(15), Phase::Phase0);
        assert_eq!(config.phase_at_slot::<Minimal>(16), Phase::Capella);
        assert_eq!(config.phase_at_epoch(1), Phase::Phase0);
        assert_eq!(config.phase_at_epoch(2), Phase::Capella);
    }

    #[test]
    fn far_future_fork_never_activates() {
        let config = Config::default();

        assert_eq!(config.fork_slot::<Minimal>(Phase::Capella), None);
        assert_eq!(config.phase_at_slot::<Minimal>(u64::MAX), Phase::Phase0);
    }
}
