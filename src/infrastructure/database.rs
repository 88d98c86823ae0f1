//! Database targets for stress test iterations.
//!
//! One iteration of a stress test is one call to
//! [`ConnectionFactory::execute`]: open a connection, prepare the configured
//! query, run it, drain every row, close the connection.
//!
//! [`SqlxConnectionFactory`] performs this against PostgreSQL, MySQL or
//! SQLite; the DSN scheme picks the driver (`postgres://`, `mysql://`,
//! `sqlite://`). Each driver is used natively so rows are drained without
//! decoding any column, whatever its type.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use futures::future::BoxFuture;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, Executor, MySqlConnection, PgConnection, SqliteConnection, Statement};
use thiserror::Error;

/// Query issued by every iteration unless configured otherwise.
pub const DEFAULT_STRESS_QUERY: &str = "select * from test_table";

// =============================================================================
// Query Error
// =============================================================================

/// Failure of a single iteration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The connection could not be opened.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The query could not be prepared.
    #[error("Prepare failed: {0}")]
    Prepare(String),

    /// The query failed while executing or streaming rows.
    #[error("Query failed: {0}")]
    Execution(String),

    /// The connection could not be closed cleanly.
    #[error("Close failed: {0}")]
    Close(String),

    /// The iteration did not finish within the configured timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Fault injected by a simulated target.
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// What a successful iteration observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryStats {
    /// Rows consumed from the result set.
    pub rows: u64,
}

// =============================================================================
// Connection Factory
// =============================================================================

/// Capability to run one complete query round trip against a target.
///
/// Returned futures are `'static` so each iteration can run on its own task.
pub trait ConnectionFactory: Send + Sync {
    /// Opens a connection, runs the query, consumes all rows and closes.
    fn execute(&self) -> BoxFuture<'static, Result<QueryStats, QueryError>>;

    /// Short description for logs; must not contain credentials.
    fn describe(&self) -> String;
}

// =============================================================================
// sqlx Connection Factory
// =============================================================================

/// Connect options of the driver selected by the DSN scheme.
#[derive(Debug, Clone)]
enum TargetOptions {
    Postgres(PgConnectOptions),
    MySql(MySqlConnectOptions),
    Sqlite(SqliteConnectOptions),
}

impl TargetOptions {
    fn parse(scheme: &str, database_url: &str) -> Result<Self, sqlx::Error> {
        match scheme {
            "postgres" | "postgresql" => {
                PgConnectOptions::from_str(database_url).map(Self::Postgres)
            }
            "mysql" => MySqlConnectOptions::from_str(database_url).map(Self::MySql),
            "sqlite" => SqliteConnectOptions::from_str(database_url).map(Self::Sqlite),
            _ => Err(sqlx::Error::Configuration(
                format!("unsupported database scheme '{scheme}'").into(),
            )),
        }
    }
}

/// Runs iterations against a real database through `sqlx`.
///
/// Every iteration opens its own connection; nothing is pooled between
/// iterations.
#[derive(Debug, Clone)]
pub struct SqlxConnectionFactory {
    options: TargetOptions,
    query: Arc<str>,
    scheme: String,
}

impl SqlxConnectionFactory {
    /// Creates a factory for the given DSN and query.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Connection` if the DSN has no supported scheme or
    /// its driver rejects it.
    pub fn new(database_url: &str, query: impl Into<Arc<str>>) -> Result<Self, QueryError> {
        let scheme = database_url
            .split_once(':')
            .map_or("", |(scheme, _)| scheme)
            .to_lowercase();
        let options = TargetOptions::parse(&scheme, database_url)
            .map_err(|error| QueryError::Connection(error.to_string()))?;

        Ok(Self {
            options,
            query: query.into(),
            scheme,
        })
    }
}

/// One full round trip on a freshly opened `$connection`.
///
/// The prepared statement is run through the driver's own row type, so no
/// column value is ever decoded.
macro_rules! round_trip {
    ($connection:ty, $options:expr, $query:expr) => {{
        let mut connection = <$connection as Connection>::connect_with($options)
            .await
            .map_err(|error| QueryError::Connection(error.to_string()))?;

        let drained = async {
            let statement = (&mut connection)
                .prepare($query)
                .await
                .map_err(|error| QueryError::Prepare(error.to_string()))?;

            let mut rows = statement.query().fetch(&mut connection);
            let mut stats = QueryStats::default();
            while rows
                .try_next()
                .await
                .map_err(|error| QueryError::Execution(error.to_string()))?
                .is_some()
            {
                stats.rows += 1;
            }
            Ok::<_, QueryError>(stats)
        }
        .await;

        let closed = connection
            .close()
            .await
            .map_err(|error| QueryError::Close(error.to_string()));

        let stats = drained?;
        closed?;
        Ok(stats)
    }};
}

impl ConnectionFactory for SqlxConnectionFactory {
    fn execute(&self) -> BoxFuture<'static, Result<QueryStats, QueryError>> {
        let options = self.options.clone();
        let query = Arc::clone(&self.query);
        Box::pin(async move {
            match &options {
                TargetOptions::Postgres(options) => round_trip!(PgConnection, options, &*query),
                TargetOptions::MySql(options) => round_trip!(MySqlConnection, options, &*query),
                TargetOptions::Sqlite(options) => round_trip!(SqliteConnection, options, &*query),
            }
        })
    }

    fn describe(&self) -> String {
        format!("sqlx:{} `{}`", self.scheme, self.query)
    }
}

// =============================================================================
// Tests
// =============================================================================
