use derivative::Derivative;

#[derive(Clone, Copy, Debug, Derivative)]
#[derivative(Default)]
pub struct StoreConfig {
    /// Blocks that skip more slots than this after their parent are rejected.
    #[derivative(Default(value = "32"))]
    pub max_empty_slots: u64,
}
