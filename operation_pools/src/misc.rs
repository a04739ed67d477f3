use anyhow::Error;
use strum::IntoStaticStr;

#[derive(Debug)]
pub enum PoolAdditionOutcome {
    Accept,
    Ignore,
    Reject(PoolRejectionReason, Error),
}

impl PoolAdditionOutcome {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

#[expect(clippy::enum_variant_names)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PoolRejectionReason {
    InvalidAttesterSlashing,
    InvalidBlsToExecutionChange,
    InvalidProposerSlashing,
    InvalidVoluntaryExit,
}
