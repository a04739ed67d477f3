use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use variant_count::VariantCount;

#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    AsRefStr,
    Display,
    EnumString,
    VariantCount,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Phase0,
    Capella,
}

/// Validity of the execution payload of a block as known to the fork choice store.
///
/// Blocks without a payload are [`PayloadStatus::Valid`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, AsRefStr, Deserialize, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum PayloadStatus {
    Valid,
    Invalid,
    Optimistic,
}

impl PayloadStatus {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid)
    }

    #[must_use]
    pub const fn is_optimistic(self) -> bool {
        matches!(self, Self::Optimistic)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SlashingKind {
    Proposer,
    Attester,
}
