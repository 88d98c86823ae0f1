//! Application configuration loaded from the environment.
//!
//! # Environment Variables
//!
//! - `HOST`: bind address (default: `127.0.0.1`)
//! - `PORT`: bind port (default: `8080`)
//! - `STATIC_DIR`: directory served under `/static/` (default: `web/`, empty disables)
//! - `DATABASE_MODE`: `sqlx` (default) | `stub`
//! - `DATABASE_URL`: DSN of the target database (required when `DATABASE_MODE=sqlx`)
//! - `STRESS_QUERY`: query issued by each iteration (default: `select * from test_table`)
//! - `RUN_ITERATION_TIMEOUT_MS`: per-iteration timeout, `0` or unset for none
//! - `RUN_MAX_CONCURRENCY`: cap on simultaneous iterations, `0` or unset for none
//! - `RUN_FAILURE_POLICY`: `tolerate` (default) | `strict`
//! - `MAX_PARALLELISM`: largest accepted `parallel` value (default: `1000`)
//! - `SEED_DEFAULTS`: register the bootstrap definitions (default: `true`)
//! - `STUB_DELAY_MS`: simulated latency in `stub` mode (default: `0`)
//! - `WORKER_THREADS`: tokio worker threads (default: one per CPU)

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use super::database::DEFAULT_STRESS_QUERY;
use crate::application::{DEFAULT_MAX_ERROR_SAMPLES, ExecutorConfig, FailurePolicy};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_STATIC_DIR: &str = "web/";
const DEFAULT_MAX_PARALLELISM: u32 = 1000;

// =============================================================================
// Configuration Types
// =============================================================================

/// Which kind of target the iterations hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatabaseMode {
    /// A real database reached through `sqlx`.
    #[default]
    Sqlx,
    /// The simulated target, for dry runs without a database.
    Stub,
}

impl FromStr for DatabaseMode {
    type Err = ConfigurationError;

    /// Parses a database mode from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidDatabaseMode` if the string is not recognized.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "sqlx" | "database" | "db" => Ok(Self::Sqlx),
            "stub" | "simulated" => Ok(Self::Stub),
            _ => Err(ConfigurationError::InvalidDatabaseMode(value.to_string())),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// HTTP bind host.
    pub host: String,
    /// HTTP bind port.
    pub port: u16,
    /// Directory served under `/static/`; `None` disables static files.
    pub static_dir: Option<PathBuf>,
    /// Kind of target.
    pub database_mode: DatabaseMode,
    /// DSN of the target database.
    pub database_url: Option<String>,
    /// Query issued by each iteration.
    pub stress_query: String,
    /// Executor settings.
    pub executor: ExecutorConfig,
    /// Largest accepted parallelism of a definition.
    pub max_parallelism: u32,
    /// Whether the bootstrap definitions are registered at startup.
    pub seed_defaults: bool,
    /// Simulated latency in stub mode.
    pub stub_delay: Duration,
    /// Tokio worker threads; `None` keeps the runtime default.
    pub worker_threads: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            static_dir: Some(PathBuf::from(DEFAULT_STATIC_DIR)),
            database_mode: DatabaseMode::default(),
            database_url: None,
            stress_query: DEFAULT_STRESS_QUERY.to_string(),
            executor: ExecutorConfig::default(),
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            seed_defaults: true,
            stub_delay: Duration::ZERO,
            worker_threads: None,
        }
    }
}

impl AppConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Creates a configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a variable holds an invalid value or
    /// the resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| {
            env::var_os(key).map(|value| value.to_string_lossy().into_owned())
        })
    }

    /// Creates a configuration from an arbitrary key lookup.
    ///
    /// Empty and whitespace-only values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a value is invalid or the resulting
    /// configuration fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let executor = ExecutorConfig {
            iteration_timeout: Some(parse_or(&read, "RUN_ITERATION_TIMEOUT_MS", 0_u64)?)
                .filter(|millis| *millis > 0)
                .map(Duration::from_millis),
            max_concurrency: Some(parse_or(&read, "RUN_MAX_CONCURRENCY", 0_usize)?)
                .filter(|limit| *limit > 0),
            failure_policy: read("RUN_FAILURE_POLICY")
                .map(|value| value.parse::<FailurePolicy>())
                .transpose()?
                .unwrap_or_default(),
            max_error_samples: DEFAULT_MAX_ERROR_SAMPLES,
        };

        let config = Self {
            host: read("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&read, "PORT", DEFAULT_PORT)?,
            static_dir: match lookup("STATIC_DIR") {
                Some(value) if value.trim().is_empty() => None,
                Some(value) => Some(PathBuf::from(value.trim())),
                None => Some(PathBuf::from(DEFAULT_STATIC_DIR)),
            },
            database_mode: read("DATABASE_MODE")
                .map(|value| value.parse::<DatabaseMode>())
                .transpose()?
                .unwrap_or_default(),
            database_url: read("DATABASE_URL"),
            stress_query: read("STRESS_QUERY").unwrap_or_else(|| DEFAULT_STRESS_QUERY.to_string()),
            executor,
            max_parallelism: parse_or(&read, "MAX_PARALLELISM", DEFAULT_MAX_PARALLELISM)?,
            seed_defaults: parse_bool_or(&read, "SEED_DEFAULTS", true)?,
            stub_delay: Duration::from_millis(parse_or(&read, "STUB_DELAY_MS", 0_u64)?),
            worker_threads: parse_optional(&read, "WORKER_THREADS")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the DSN is missing in `sqlx` mode,
    /// the stress query is empty or the worker thread count is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.database_mode == DatabaseMode::Sqlx && self.database_url.is_none() {
            return Err(ConfigurationError::MissingDatabaseUrl);
        }

        if self.worker_threads == Some(0) {
            return Err(ConfigurationError::InvalidValue {
                key: "WORKER_THREADS".to_string(),
                value: "0".to_string(),
                message: "at least one worker thread is required".to_string(),
            });
        }

        if self.stress_query.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue {
                key: "STRESS_QUERY".to_string(),
                value: self.stress_query.clone(),
                message: "query must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidAddress` if host and port do not form an address.
    pub fn bind_address(&self) -> Result<SocketAddr, ConfigurationError> {
        let address = format!("{}:{}", self.host, self.port);
        address
            .parse()
            .map_err(|_| ConfigurationError::InvalidAddress(address))
    }
}

fn parse_or<T, R>(read: &R, key: &str, default: T) -> Result<T, ConfigurationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    R: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(read, key)?.unwrap_or(default))
}

fn parse_optional<T, R>(read: &R, key: &str) -> Result<Option<T>, ConfigurationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    R: Fn(&str) -> Option<String>,
{
    read(key)
        .map(|value| {
            value
                .parse()
                .map_err(|error: T::Err| ConfigurationError::InvalidValue {
                    key: key.to_string(),
                    value,
                    message: error.to_string(),
                })
        })
        .transpose()
}

fn parse_bool_or<R>(read: &R, key: &str, default: bool) -> Result<bool, ConfigurationError>
where
    R: Fn(&str) -> Option<String>,
{
    read(key).map_or(Ok(default), |value| {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigurationError::InvalidValue {
                key: key.to_string(),
                value,
                message: "expected a boolean".to_string(),
            }),
        }
    })
}

/// Builder for `AppConfig`.
///
/// # Example
///
/// ```
/// use db_stress_test::infrastructure::{AppConfig, DatabaseMode};
///
/// let config = AppConfig::builder()
///     .database_mode(DatabaseMode::Stub)
///     .max_parallelism(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_parallelism, 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Sets the bind host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the bind port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets or clears the static file directory.
    #[must_use]
    pub fn static_dir(mut self, directory: Option<PathBuf>) -> Self {
        self.config.static_dir = directory;
        self
    }

    /// Sets the database mode.
    #[must_use]
    pub const fn database_mode(mut self, mode: DatabaseMode) -> Self {
        self.config.database_mode = mode;
        self
    }

    /// Sets the database DSN.
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    /// Sets the query issued by each iteration.
    #[must_use]
    pub fn stress_query(mut self, query: impl Into<String>) -> Self {
        self.config.stress_query = query.into();
        self
    }

    /// Sets the executor settings.
    #[must_use]
    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.config.executor = executor;
        self
    }

    /// Sets the largest accepted parallelism.
    #[must_use]
    pub const fn max_parallelism(mut self, max_parallelism: u32) -> Self {
        self.config.max_parallelism = max_parallelism;
        self
    }

    /// Sets whether bootstrap definitions are registered.
    #[must_use]
    pub const fn seed_defaults(mut self, seed_defaults: bool) -> Self {
        self.config.seed_defaults = seed_defaults;
        self
    }

    /// Sets the simulated latency of stub mode.
    #[must_use]
    pub const fn stub_delay(mut self, delay: Duration) -> Self {
        self.config.stub_delay = delay;
        self
    }

    /// Sets the tokio worker thread count.
    #[must_use]
    pub const fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = Some(threads);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid.
    pub fn build(self) -> Result<AppConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Invalid database mode value.
    #[error("Invalid database mode: '{0}'. Expected 'sqlx' or 'stub'")]
    InvalidDatabaseMode(String),

    /// Invalid failure policy value.
    #[error("Invalid failure policy: '{0}'. Expected 'tolerate' or 'strict'")]
    InvalidFailurePolicy(String),

    /// Missing `DATABASE_URL` when database mode is sqlx.
    #[error("DATABASE_URL environment variable is required when DATABASE_MODE=sqlx")]
    MissingDatabaseUrl,

    /// A variable could not be parsed.
    #[error("Invalid value for {key}: '{value}' ({message})")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Parser message.
        message: String,
    },

    /// Host and port do not form a socket address.
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigurationError> {
        let variables: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        AppConfig::from_lookup(|key| variables.get(key).cloned())
    }

    // -------------------------------------------------------------------------
    // DatabaseMode Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[case("sqlx", DatabaseMode::Sqlx)]
    #[case("DB", DatabaseMode::Sqlx)]
    #[case("stub", DatabaseMode::Stub)]
    #[case("Simulated", DatabaseMode::Stub)]
    fn test_database_mode_from_str_valid(#[case] input: &str, #[case] expected: DatabaseMode) {
        assert_eq!(input.parse::<DatabaseMode>().unwrap(), expected);
    }

    #[rstest]
    #[case("odbc")]
    #[case("")]
    fn test_database_mode_from_str_invalid(#[case] input: &str) {
        assert_eq!(
            input.parse::<DatabaseMode>(),
            Err(ConfigurationError::InvalidDatabaseMode(input.to_string()))
        );
    }

    // -------------------------------------------------------------------------
    // from_lookup Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_defaults_require_database_url() {
        assert_eq!(load(&[]), Err(ConfigurationError::MissingDatabaseUrl));
    }

    #[rstest]
    fn test_defaults_with_database_url() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/stress")]).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.static_dir, Some(PathBuf::from("web/")));
        assert_eq!(config.stress_query, "select * from test_table");
        assert_eq!(config.executor, ExecutorConfig::default());
        assert_eq!(config.max_parallelism, 1000);
        assert!(config.seed_defaults);
        assert_eq!(config.worker_threads, None);
    }

    #[rstest]
    #[case("4", Some(4))]
    #[case(" 16 ", Some(16))]
    #[case("", None)]
    fn test_worker_threads(#[case] value: &str, #[case] expected: Option<usize>) {
        let config = load(&[("DATABASE_MODE", "stub"), ("WORKER_THREADS", value)]).unwrap();
        assert_eq!(config.worker_threads, expected);
    }

    #[rstest]
    fn test_stub_mode_needs_no_url() {
        let config = load(&[("DATABASE_MODE", "stub"), ("STUB_DELAY_MS", "25")]).unwrap();
        assert_eq!(config.database_mode, DatabaseMode::Stub);
        assert_eq!(config.stub_delay, Duration::from_millis(25));
    }

    #[rstest]
    fn test_executor_settings() {
        let config = load(&[
            ("DATABASE_MODE", "stub"),
            ("RUN_ITERATION_TIMEOUT_MS", "1500"),
            ("RUN_MAX_CONCURRENCY", "8"),
            ("RUN_FAILURE_POLICY", "strict"),
        ])
        .unwrap();
        assert_eq!(
            config.executor.iteration_timeout,
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.executor.max_concurrency, Some(8));
        assert_eq!(config.executor.failure_policy, FailurePolicy::Strict);
    }

    #[rstest]
    fn test_zero_limits_mean_unbounded() {
        let config = load(&[
            ("DATABASE_MODE", "stub"),
            ("RUN_ITERATION_TIMEOUT_MS", "0"),
            ("RUN_MAX_CONCURRENCY", "0"),
        ])
        .unwrap();
        assert_eq!(config.executor.iteration_timeout, None);
        assert_eq!(config.executor.max_concurrency, None);
    }

    #[rstest]
    fn test_empty_static_dir_disables_static_files() {
        let config = load(&[("DATABASE_MODE", "stub"), ("STATIC_DIR", "")]).unwrap();
        assert_eq!(config.static_dir, None);
    }

    #[rstest]
    #[case("PORT", "eighty")]
    #[case("PORT", "70000")]
    #[case("MAX_PARALLELISM", "-1")]
    #[case("SEED_DEFAULTS", "maybe")]
    #[case("RUN_ITERATION_TIMEOUT_MS", "soon")]
    #[case("WORKER_THREADS", "0")]
    #[case("WORKER_THREADS", "many")]
    fn test_invalid_values_are_rejected(#[case] key: &str, #[case] value: &str) {
        let result = load(&[("DATABASE_MODE", "stub"), (key, value)]);
        match result {
            Err(ConfigurationError::InvalidValue { key: reported, .. }) => {
                assert_eq!(reported, key);
            }
            other => panic!("Expected InvalidValue for {key}, got {other:?}"),
        }
    }

    #[rstest]
    fn test_invalid_failure_policy() {
        let result = load(&[("DATABASE_MODE", "stub"), ("RUN_FAILURE_POLICY", "ignore")]);
        assert_eq!(
            result,
            Err(ConfigurationError::InvalidFailurePolicy("ignore".to_string()))
        );
    }

    // -------------------------------------------------------------------------
    // Builder / Address Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_builder_validates() {
        let result = AppConfig::builder().database_mode(DatabaseMode::Sqlx).build();
        assert_eq!(result, Err(ConfigurationError::MissingDatabaseUrl));

        let result = AppConfig::builder()
            .database_mode(DatabaseMode::Stub)
            .stress_query("  ")
            .build();
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));

        let result = AppConfig::builder()
            .database_mode(DatabaseMode::Stub)
            .worker_threads(0)
            .build();
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[rstest]
    fn test_bind_address() {
        let config = AppConfig::builder()
            .database_mode(DatabaseMode::Stub)
            .host("0.0.0.0")
            .port(3000)
            .build()
            .unwrap();
        assert_eq!(config.bind_address().unwrap().to_string(), "0.0.0.0:3000");

        let config = AppConfig::builder()
            .database_mode(DatabaseMode::Stub)
            .host("not a host")
            .build()
            .unwrap();
        assert!(matches!(
            config.bind_address(),
            Err(ConfigurationError::InvalidAddress(_))
        ));
    }
}
