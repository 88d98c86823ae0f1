//! Application services.

pub mod executor;

pub use executor::{
    DEFAULT_MAX_ERROR_SAMPLES, ExecutionError, ExecutorConfig, FailurePolicy, IterationReport,
    RunOutcome, StressTestExecutor,
};
