//! Domain module for stress test definitions.


pub use stress_test::{
    RUN_TIMESTAMP_FORMAT, RunTimestamp, StressTest, StressTestDraft, StressTestId, default_drafts,
};
