pub use crate::{
    helpers::{start_timer_vec, stop_and_record},
    metrics::Metrics,
};

mod helpers;
mod metrics;
