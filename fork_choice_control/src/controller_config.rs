use core::time::Duration;

use derivative::Derivative;
use fork_choice_store::StoreConfig;

#[derive(Clone, Copy, Debug, Derivative)]
#[derivative(Default)]
pub struct ControllerConfig {
    /// Hot states are written to storage while finality is delayed by more than this many epochs.
    #[derivative(Default(value = "100"))]
    pub epochs_since_finality_threshold: u64,
    /// Deadline for deposit bookkeeping triggered by a new finalized checkpoint.
    #[derivative(Default(value = "Duration::from_secs(12)"))]
    pub deposit_deadline: Duration,
    #[derivative(Default(value = "Duration::from_secs(1)"))]
    pub state_cache_lock_timeout: Duration,
    pub forward_attestations_to_slasher: bool,
    #[derivative(Default(value = "crate::events::DEFAULT_MAX_EVENTS"))]
    pub max_events: usize,
    /// Prune blocks, states and attestations made obsolete by a new finalized checkpoint.
    #[derivative(Default(value = "true"))]
    pub archive_finalized: bool,
    pub store_config: StoreConfig,
}
