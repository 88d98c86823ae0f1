//! Data Transfer Objects for API requests and responses.
//!
//! The wire record is `{name, parallel, id, run, duration}`. A definition
//! that has never run is sent with `run: ""` and `duration: 0`.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::application::{IterationReport, RunOutcome};
use crate::domain::{StressTest, StressTestDraft, StressTestId};

// =============================================================================
// Request DTOs
// =============================================================================

/// Request body for creating or replacing a definition.
///
/// Every field is optional; missing fields take their zero value, which is
/// what makes an update a whole-record replace.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StressTestPayload {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Number of concurrent queries per run.
    #[serde(default)]
    pub parallel: u32,
    /// Ignored on create; must match the path on update.
    #[serde(default)]
    pub id: Option<u64>,
    /// Formatted start of the last run, empty if never run.
    #[serde(default)]
    pub run: String,
    /// Seconds taken by the last run.
    #[serde(default)]
    pub duration: f64,
}

impl StressTestPayload {
    /// Converts a create request into a draft, dropping any client id and run fields.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `parallel` exceeds `max_parallelism`.
    pub fn into_draft(self, max_parallelism: u32) -> Result<StressTestDraft, ValidationError> {
        let parallelism = validate_parallelism(self.parallel, max_parallelism)?;
        Ok(StressTestDraft::new(self.name, parallelism))
    }

    /// Converts an update request into the full replacement record for `id`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the body id disagrees with `id`, if
    /// `parallel` exceeds `max_parallelism`, or if `duration` is negative.
    pub fn into_stress_test(
        self,
        id: StressTestId,
        max_parallelism: u32,
    ) -> Result<StressTest, ValidationError> {
        if let Some(body_id) = self.id
            && body_id != id.value()
        {
            return Err(ValidationError::new(format!(
                "Id {body_id} in body does not match id {id} in path"
            )));
        }
        let parallelism = validate_parallelism(self.parallel, max_parallelism)?;
        let duration = validate_duration(self.duration)?;

        let has_run = !self.run.is_empty();
        Ok(StressTest {
            id,
            name: self.name,
            parallelism,
            last_run_timestamp: has_run.then_some(self.run),
            last_run_duration_seconds: (has_run || duration > 0.0).then_some(duration),
        })
    }
}

/// Validates the requested parallelism against the configured maximum.
///
/// # Errors
///
/// Returns `ValidationError` if `parallel` exceeds `max_parallelism`.
pub fn validate_parallelism(parallel: u32, max_parallelism: u32) -> Result<u32, ValidationError> {
    if parallel > max_parallelism {
        return Err(ValidationError::new(format!(
            "Parallel must be at most {max_parallelism}, got {parallel}"
        )));
    }
    Ok(parallel)
}

/// Validates a client-supplied run duration.
///
/// # Errors
///
/// Returns `ValidationError` if `duration` is negative or not finite.
pub fn validate_duration(duration: f64) -> Result<f64, ValidationError> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(ValidationError::new(format!(
            "Duration must be a non-negative number, got {duration}"
        )));
    }
    Ok(duration)
}

// =============================================================================
// Response DTOs
// =============================================================================

/// Wire form of a stored definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResponse {
    /// Display name.
    pub name: String,
    /// Number of concurrent queries per run.
    pub parallel: u32,
    /// Registry-assigned id.
    pub id: u64,
    /// Formatted start of the last run, empty if never run.
    pub run: String,
    /// Seconds taken by the last run, 0 if never run.
    pub duration: f64,
}

impl From<&StressTest> for StressTestResponse {
    fn from(stress_test: &StressTest) -> Self {
        Self {
            name: stress_test.name.clone(),
            parallel: stress_test.parallelism,
            id: stress_test.id.value(),
            run: stress_test.last_run_timestamp.clone().unwrap_or_default(),
            duration: stress_test.last_run_duration_seconds.unwrap_or_default(),
        }
    }
}

impl From<StressTest> for StressTestResponse {
    fn from(stress_test: StressTest) -> Self {
        Self::from(&stress_test)
    }
}

/// Iteration counts of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationSummaryResponse {
    /// Iterations started.
    pub attempted: u32,
    /// Iterations that completed.
    pub succeeded: u32,
    /// Iterations that failed or timed out.
    pub failed: u32,
    /// Rows read by successful iterations.
    pub rows: u64,
    /// Sample of failure messages.
    pub errors: Vec<String>,
}

impl From<&IterationReport> for IterationSummaryResponse {
    fn from(report: &IterationReport) -> Self {
        Self {
            attempted: report.attempted,
            succeeded: report.succeeded,
            failed: report.failed,
            rows: report.rows,
            errors: report.error_samples.clone(),
        }
    }
}

/// Response of `POST /stress_tests/{id}/run`: the updated record plus its iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    /// The definition as stored after the run.
    #[serde(flatten)]
    pub stress_test: StressTestResponse,
    /// What happened to the individual queries.
    pub iterations: IterationSummaryResponse,
}

impl From<&RunOutcome> for RunResponse {
    fn from(outcome: &RunOutcome) -> Self {
        Self {
            stress_test: StressTestResponse::from(&outcome.stress_test),
            iterations: IterationSummaryResponse::from(&outcome.report),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
