//! Stress test execution.
//!
//! A run resolves a definition, starts `parallelism` iterations at once
//! against the configured [`ConnectionFactory`], waits for every one of them,
//! and writes the start time and elapsed wall-clock time back into the
//! registry.
//!
//! # Failure handling
//!
//! A failed iteration never aborts the others. Failures are counted and a
//! few messages are kept as samples in the [`IterationReport`]. Whether a run
//! in which *every* iteration failed is still a success is decided by the
//! [`FailurePolicy`]; under both policies the timing is recorded.
//!
//! # Cancellation
//!
//! Iterations run on a `JoinSet` owned by the `run` future. Dropping that
//! future (for example when the HTTP client disconnects) aborts every
//! iteration still in flight.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::domain::{RunTimestamp, StressTest, StressTestId};
use crate::infrastructure::{
    ConfigurationError, ConnectionFactory, QueryError, QueryStats, RegistryError,
    StressTestRegistry,
};

/// Default number of failure messages kept per run.
pub const DEFAULT_MAX_ERROR_SAMPLES: usize = 5;

// =============================================================================
// Configuration
// =============================================================================

/// What a run reports when every iteration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The run succeeds; failures are only reported in the iteration summary.
    #[default]
    Tolerate,
    /// The run fails with [`ExecutionError::AllIterationsFailed`].
    Strict,
}

impl FromStr for FailurePolicy {
    type Err = ConfigurationError;

    /// Parses a failure policy from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidFailurePolicy` if the string is not recognized.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "tolerate" | "lenient" => Ok(Self::Tolerate),
            "strict" | "fail_on_all" => Ok(Self::Strict),
            _ => Err(ConfigurationError::InvalidFailurePolicy(value.to_string())),
        }
    }
}

/// Runtime settings of the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Upper bound for a single iteration; `None` waits indefinitely.
    pub iteration_timeout: Option<Duration>,
    /// Upper bound for simultaneously running iterations; `None` runs all at once.
    pub max_concurrency: Option<usize>,
    /// Outcome of a run in which every iteration failed.
    pub failure_policy: FailurePolicy,
    /// Number of failure messages kept in the report.
    pub max_error_samples: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            iteration_timeout: None,
            max_concurrency: None,
            failure_policy: FailurePolicy::default(),
            max_error_samples: DEFAULT_MAX_ERROR_SAMPLES,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Aggregate of all iterations of one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IterationReport {
    /// Iterations started.
    pub attempted: u32,
    /// Iterations that completed their round trip.
    pub succeeded: u32,
    /// Iterations that failed, timed out or panicked.
    pub failed: u32,
    /// Rows consumed across all successful iterations.
    pub rows: u64,
    /// First few failure messages.
    pub error_samples: Vec<String>,
}

impl IterationReport {
    fn new(attempted: u32) -> Self {
        Self {
            attempted,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: Result<QueryStats, QueryError>, max_error_samples: usize) {
        match outcome {
            Ok(stats) => {
                self.succeeded += 1;
                self.rows += stats.rows;
            }
            Err(error) => {
                self.failed += 1;
                if self.error_samples.len() < max_error_samples {
                    self.error_samples.push(error.to_string());
                }
            }
        }
    }

    /// Returns true if there was at least one iteration and none succeeded.
    #[must_use]
    pub const fn all_failed(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

/// A completed run: the definition as stored afterwards and its iteration summary.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The definition including the new run fields.
    pub stress_test: StressTest,
    /// Summary of the iterations.
    pub report: IterationReport,
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The definition does not exist, or disappeared before the result was stored.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Every iteration failed under [`FailurePolicy::Strict`].
    ///
    /// The timing has already been recorded when this is returned.
    #[error("All {attempted} iterations of stress test {id} failed")]
    AllIterationsFailed {
        /// The definition that was run.
        id: StressTestId,
        /// Number of iterations attempted.
        attempted: u32,
        /// The recorded outcome.
        outcome: Box<RunOutcome>,
    },
}

// =============================================================================
// Executor
// =============================================================================

/// Runs stress tests held in a [`StressTestRegistry`].
#[derive(Clone)]
pub struct StressTestExecutor {
    registry: Arc<StressTestRegistry>,
    factory: Arc<dyn ConnectionFactory>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for StressTestExecutor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StressTestExecutor")
            .field("registry", &self.registry)
            .field("factory", &self.factory.describe())
            .field("config", &self.config)
            .finish()
    }
}

impl StressTestExecutor {
    /// Creates an executor with default settings.
    #[must_use]
    pub fn new(registry: Arc<StressTestRegistry>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self::with_config(registry, factory, ExecutorConfig::default())
    }

    /// Creates an executor with the given settings.
    #[must_use]
    pub fn with_config(
        registry: Arc<StressTestRegistry>,
        factory: Arc<dyn ConnectionFactory>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            factory,
            config,
        }
    }

    /// Runs the stress test with the given id.
    ///
    /// # Errors
    ///
    /// - `ExecutionError::Registry` if the id is unknown, or the definition was
    ///   removed while the run was in flight. Nothing is written in either case.
    /// - `ExecutionError::AllIterationsFailed` under the strict policy.
    pub async fn run(&self, id: StressTestId) -> Result<RunOutcome, ExecutionError> {
        let stress_test = self.registry.get(id)?;
        let parallelism = stress_test.parallelism;

        tracing::info!(
            %id,
            parallelism,
            factory = %self.factory.describe(),
            "Starting stress test run"
        );

        let started_at = RunTimestamp::now();
        let clock = Instant::now();
        let report = self.fan_out(parallelism).await;
        let duration_seconds = clock.elapsed().as_secs_f64();

        let stress_test = self
            .registry
            .record_run(id, started_at, duration_seconds)?;

        tracing::info!(
            %id,
            parallelism,
            succeeded = report.succeeded,
            failed = report.failed,
            rows = report.rows,
            duration_seconds,
            "Stress test run complete"
        );

        let outcome = RunOutcome {
            stress_test,
            report,
        };

        if self.config.failure_policy == FailurePolicy::Strict && outcome.report.all_failed() {
            return Err(ExecutionError::AllIterationsFailed {
                id,
                attempted: outcome.report.attempted,
                outcome: Box::new(outcome),
            });
        }

        Ok(outcome)
    }

    /// Starts `parallelism` iterations and waits for all of them.
    async fn fan_out(&self, parallelism: u32) -> IterationReport {
        let mut report = IterationReport::new(parallelism);
        if parallelism == 0 {
            return report;
        }

        let limiter = self
            .config
            .max_concurrency
            .filter(|limit| *limit > 0)
            .map(|limit| Arc::new(Semaphore::new(limit)));

        let mut iterations = JoinSet::new();
        for iteration in 0..parallelism {
            iterations.spawn(guarded_iteration(
                Arc::clone(&self.factory),
                limiter.clone(),
                self.config.iteration_timeout,
                iteration,
            ));
        }

        while let Some(joined) = iterations.join_next().await {
            let outcome = joined.unwrap_or_else(|error| Err(join_failure(&error)));
            report.record(outcome, self.config.max_error_samples);
        }

        report
    }
}

/// Waits for a concurrency permit if limited, then runs one iteration.
async fn guarded_iteration(
    factory: Arc<dyn ConnectionFactory>,
    limiter: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
    iteration: u32,
) -> Result<QueryStats, QueryError> {
    let _permit = match limiter {
        Some(semaphore) => Some(semaphore.acquire_owned().await.map_err(|error| {
            QueryError::Execution(format!("concurrency limiter closed: {error}"))
        })?),
        None => None,
    };

    let outcome = run_iteration(factory.as_ref(), timeout).await;
    if let Err(error) = &outcome {
        tracing::warn!(iteration, %error, "Stress test iteration failed");
    }
    outcome
}

/// Runs one iteration, bounded by `timeout` if set.
async fn run_iteration(
    factory: &dyn ConnectionFactory,
    timeout: Option<Duration>,
) -> Result<QueryStats, QueryError> {
    let round_trip = factory.execute();
    match timeout {
        Some(limit) => tokio::time::timeout(limit, round_trip)
            .await
            .unwrap_or(Err(QueryError::Timeout(limit))),
        None => round_trip.await,
    }
}

fn join_failure(error: &JoinError) -> QueryError {
    if error.is_panic() {
        tracing::error!(%error, "Stress test iteration panicked");
        QueryError::Execution("iteration panicked".to_string())
    } else {
        QueryError::Execution("iteration was cancelled".to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StressTestDraft;
    use crate::infrastructure::{StubConnectionFactory, StubFailure};
    use rstest::rstest;

    fn executor_with(
        stub: &StubConnectionFactory,
        config: ExecutorConfig,
    ) -> (Arc<StressTestRegistry>, StressTestExecutor) {
        let registry = Arc::new(StressTestRegistry::new());
        let executor =
            StressTestExecutor::with_config(Arc::clone(&registry), Arc::new(stub.clone()), config);
        (registry, executor)
    }

    // -------------------------------------------------------------------------
    // FailurePolicy Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[case("tolerate", FailurePolicy::Tolerate)]
    #[case("LENIENT", FailurePolicy::Tolerate)]
    #[case("strict", FailurePolicy::Strict)]
    #[case("fail_on_all", FailurePolicy::Strict)]
    fn test_failure_policy_from_str_valid(#[case] input: &str, #[case] expected: FailurePolicy) {
        assert_eq!(input.parse::<FailurePolicy>().unwrap(), expected);
    }

    #[rstest]
    fn test_failure_policy_from_str_invalid() {
        let result = "panic".parse::<FailurePolicy>();
        assert_eq!(
            result,
            Err(ConfigurationError::InvalidFailurePolicy("panic".to_string()))
        );
    }

    // -------------------------------------------------------------------------
    // IterationReport Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_report_keeps_limited_error_samples() {
        let mut report = IterationReport::new(4);
        for index in 0..4 {
            report.record(Err(QueryError::Injected(format!("e{index}"))), 2);
        }
        assert_eq!(report.failed, 4);
        assert_eq!(report.error_samples.len(), 2);
        assert!(report.all_failed());
    }

    #[rstest]
    fn test_empty_report_is_not_all_failed() {
        assert!(!IterationReport::new(0).all_failed());
    }

    // -------------------------------------------------------------------------
    // Run Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_run_unknown_id_is_not_found() {
        let stub = StubConnectionFactory::new();
        let (registry, executor) = executor_with(&stub, ExecutorConfig::default());
        registry.add(StressTestDraft::new("existing", 1));

        let result = executor.run(StressTestId::new(9)).await;

        assert!(matches!(
            result,
            Err(ExecutionError::Registry(RegistryError::NotFound(_)))
        ));
        assert_eq!(stub.attempts(), 0);
        assert!(!registry.get(StressTestId::new(1)).unwrap().has_run());
        assert_eq!(registry.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_run_zero_parallelism_executes_nothing() {
        let stub = StubConnectionFactory::new();
        let (registry, executor) = executor_with(&stub, ExecutorConfig::default());
        let stored = registry.add(StressTestDraft::new("idle", 0));

        let outcome = executor.run(stored.id).await.unwrap();

        assert_eq!(stub.attempts(), 0);
        assert_eq!(outcome.report.attempted, 0);
        assert!(outcome.stress_test.has_run());
        let duration = outcome.stress_test.last_run_duration_seconds.unwrap();
        assert!((0.0..0.5).contains(&duration));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_run_iterations_are_concurrent() {
        let stub = StubConnectionFactory::new()
            .with_delay(Duration::from_millis(100))
            .with_rows(10);
        let (registry, executor) = executor_with(&stub, ExecutorConfig::default());
        let stored = registry.add(StressTestDraft::new("Load Test", 4));

        let outcome = executor.run(stored.id).await.unwrap();

        assert_eq!(stub.attempts(), 4);
        assert_eq!(stub.peak_in_flight(), 4);
        assert_eq!(outcome.report.succeeded, 4);
        assert_eq!(outcome.report.rows, 40);
        let duration = outcome.stress_test.last_run_duration_seconds.unwrap();
        assert!(
            (0.1..0.2).contains(&duration),
            "a concurrent batch spans one latency, got {duration}"
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_run_respects_max_concurrency() {
        let stub = StubConnectionFactory::new().with_delay(Duration::from_millis(100));
        let config = ExecutorConfig {
            max_concurrency: Some(2),
            ..ExecutorConfig::default()
        };
        let (registry, executor) = executor_with(&stub, config);
        let stored = registry.add(StressTestDraft::new("bounded", 6));

        let outcome = executor.run(stored.id).await.unwrap();

        assert_eq!(stub.peak_in_flight(), 2);
        assert_eq!(outcome.report.succeeded, 6);
        let duration = outcome.stress_test.last_run_duration_seconds.unwrap();
        assert!((0.3..0.4).contains(&duration), "got {duration}");
    }

    #[rstest]
    #[tokio::test]
    async fn test_run_partial_failures_do_not_abort() {
        let stub = StubConnectionFactory::new().with_failure(StubFailure::EveryNth(2));
        let (registry, executor) = executor_with(&stub, ExecutorConfig::default());
        let stored = registry.add(StressTestDraft::new("flaky", 6));

        let outcome = executor.run(stored.id).await.unwrap();

        assert_eq!(stub.attempts(), 6);
        assert_eq!(outcome.report.attempted, 6);
        assert_eq!(outcome.report.succeeded, 3);
        assert_eq!(outcome.report.failed, 3);
        assert_eq!(outcome.report.error_samples.len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn test_run_all_failed_tolerated() {
        let stub = StubConnectionFactory::failing("refused");
        let (registry, executor) = executor_with(&stub, ExecutorConfig::default());
        let stored = registry.add(StressTestDraft::new("down", 3));

        let outcome = executor.run(stored.id).await.unwrap();

        assert!(outcome.report.all_failed());
        assert_eq!(outcome.report.error_samples[0], "Injected failure: refused");
        assert!(registry.get(stored.id).unwrap().has_run());
    }

    #[rstest]
    #[tokio::test]
    async fn test_run_all_failed_strict_still_records_timing() {
        let stub = StubConnectionFactory::failing("refused");
        let config = ExecutorConfig {
            failure_policy: FailurePolicy::Strict,
            ..ExecutorConfig::default()
        };
        let (registry, executor) = executor_with(&stub, config);
        let stored = registry.add(StressTestDraft::new("down", 3));

        let result = executor.run(stored.id).await;

        match result {
            Err(ExecutionError::AllIterationsFailed { id, attempted, .. }) => {
                assert_eq!(id, stored.id);
                assert_eq!(attempted, 3);
            }
            other => panic!("Expected AllIterationsFailed, got {other:?}"),
        }
        assert!(registry.get(stored.id).unwrap().has_run());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_run_iteration_timeout() {
        let stub = StubConnectionFactory::new().with_delay(Duration::from_secs(30));
        let config = ExecutorConfig {
            iteration_timeout: Some(Duration::from_millis(200)),
            ..ExecutorConfig::default()
        };
        let (registry, executor) = executor_with(&stub, config);
        let stored = registry.add(StressTestDraft::new("slow", 2));

        let outcome = executor.run(stored.id).await.unwrap();

        assert_eq!(outcome.report.failed, 2);
        assert_eq!(outcome.report.error_samples[0], "Timed out after 200ms");
        assert_eq!(stub.in_flight(), 0);
        let duration = outcome.stress_test.last_run_duration_seconds.unwrap();
        assert!((0.2..0.3).contains(&duration), "got {duration}");
    }

    #[rstest]
    #[tokio::test]
    async fn test_run_keeps_id_and_name() {
        let stub = StubConnectionFactory::new();
        let (registry, executor) = executor_with(&stub, ExecutorConfig::default());
        registry.add(StressTestDraft::new("first", 1));
        let stored = registry.add(StressTestDraft::new("Load Test", 3));

        let outcome = executor.run(stored.id).await.unwrap();

        assert_eq!(outcome.stress_test.id, stored.id);
        assert_eq!(outcome.stress_test.name, "Load Test");
        assert_eq!(outcome.stress_test.parallelism, 3);
        assert!(!outcome.stress_test.last_run_timestamp.unwrap().is_empty());
        assert_eq!(registry.list().len(), 2);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_dropping_run_aborts_iterations() {
        let stub = StubConnectionFactory::new().with_delay(Duration::from_secs(60));
        let (registry, executor) = executor_with(&stub, ExecutorConfig::default());
        let stored = registry.add(StressTestDraft::new("abandoned", 3));

        let result = tokio::time::timeout(Duration::from_millis(50), executor.run(stored.id)).await;
        assert!(result.is_err());

        // Aborted tasks drop their futures on the next scheduler pass.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(stub.in_flight(), 0);
        assert!(!registry.get(stored.id).unwrap().has_run());
    }
}
