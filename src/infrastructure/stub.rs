//! Simulated database target.
//!
//! [`StubConnectionFactory`] stands in for a real database: each iteration
//! sleeps for a configured latency, then succeeds with a fixed row count or
//! fails according to its fail injection setting. It also counts attempts and
//! the highest number of iterations in flight at once, which makes the
//! executor's fan-out observable.
//!
//! All timing goes through `tokio::time`, so paused-clock tests are exact.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use super::database::{ConnectionFactory, QueryError, QueryStats};

// =============================================================================
// Fail Injection
// =============================================================================

/// When the stub should fail an iteration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StubFailure {
    /// Every iteration succeeds.
    #[default]
    Never,
    /// Every iteration fails with the given message.
    Always(String),
    /// Attempts whose 1-based number is a multiple of `n` fail.
    EveryNth(u64),
}

impl StubFailure {
    fn check(&self, attempt: u64) -> Result<(), QueryError> {
        match self {
            Self::Never => Ok(()),
            Self::Always(message) => Err(QueryError::Injected(message.clone())),
            Self::EveryNth(n) if *n > 0 && attempt % n == 0 => Err(QueryError::Injected(
                format!("attempt {attempt} is a multiple of {n}"),
            )),
            Self::EveryNth(_) => Ok(()),
        }
    }
}

// =============================================================================
// Counters
// =============================================================================

#[derive(Debug, Default)]
struct StubCounters {
    attempts: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements `in_flight` when an iteration ends, including by cancellation.
struct InFlightGuard(Arc<StubCounters>);

impl InFlightGuard {
    fn enter(counters: Arc<StubCounters>) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Stub Connection Factory
// =============================================================================

/// Simulated target with configurable latency and fail injection.
///
/// # Example
///
/// ```ignore
/// let stub = StubConnectionFactory::new()
///     .with_delay(Duration::from_millis(50))
///     .with_failure(StubFailure::EveryNth(3));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StubConnectionFactory {
    delay: Duration,
    rows_per_query: u64,
    failure: StubFailure,
    counters: Arc<StubCounters>,
}

impl StubConnectionFactory {
    /// Creates a stub that answers immediately with zero rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stub whose every iteration fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new().with_failure(StubFailure::Always(message.into()))
    }

    /// Sets the simulated latency of one iteration.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the number of rows each successful iteration reports.
    #[must_use]
    pub const fn with_rows(mut self, rows: u64) -> Self {
        self.rows_per_query = rows;
        self
    }

    /// Sets the fail injection rule.
    #[must_use]
    pub fn with_failure(mut self, failure: StubFailure) -> Self {
        self.failure = failure;
        self
    }

    /// Number of iterations started so far.
    pub fn attempts(&self) -> u64 {
        self.counters.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of iterations observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Number of iterations currently running.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for StubConnectionFactory {
    fn execute(&self) -> BoxFuture<'static, Result<QueryStats, QueryError>> {
        let counters = Arc::clone(&self.counters);
        let delay = self.delay;
        let rows = self.rows_per_query;
        let failure = self.failure.clone();
        Box::pin(async move {
            let attempt = counters.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlightGuard::enter(counters);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            failure.check(attempt)?;
            Ok(QueryStats { rows })
        })
    }

    fn describe(&self) -> String {
        format!("stub (delay {:?})", self.delay)
    }
}

// =============================================================================
// Tests
// =============================================================================
