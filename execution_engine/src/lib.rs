pub use crate::{
    execution_engine::{ExecutionEngine, MockExecutionEngine, NullExecutionEngine},
    types::{ForkChoiceStateV1, PayloadStatusV1, PayloadValidationStatus},
};

mod execution_engine;
mod types;
