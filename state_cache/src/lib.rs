pub use crate::state_cache::{CacheLockError, StateCache};

mod state_cache;
