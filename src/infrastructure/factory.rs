//! Target factory for runtime database selection.
//!
//! Turns an [`AppConfig`] into the [`ConnectionFactory`] the executor hits:
//! a real database through `sqlx`, or the simulated stub.

use std::sync::Arc;

use thiserror::Error;

use super::config::{AppConfig, ConfigurationError, DatabaseMode};
use super::database::{ConnectionFactory, SqlxConnectionFactory};
use super::stub::StubConnectionFactory;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while creating the target.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The database DSN was rejected.
    #[error("Database connection error: {0}")]
    DatabaseConnection(String),
}

// =============================================================================
// Target Factory
// =============================================================================

/// Creates the connection factory selected by the configuration.
#[derive(Debug, Clone)]
pub struct TargetFactory {
    config: AppConfig,
}

impl TargetFactory {
    /// Creates a new target factory with the given configuration.
    #[must_use]
    pub const fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Creates the target.
    ///
    /// No connection is opened here; each iteration opens its own.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError` if the DSN is missing or malformed in `sqlx` mode.
    pub fn create(&self) -> Result<Arc<dyn ConnectionFactory>, FactoryError> {
        match self.config.database_mode {
            DatabaseMode::Stub => Ok(Arc::new(
                StubConnectionFactory::new().with_delay(self.config.stub_delay),
            )),
            DatabaseMode::Sqlx => {
                let url = self
                    .config
                    .database_url
                    .as_deref()
                    .ok_or(ConfigurationError::MissingDatabaseUrl)?;
                let factory = SqlxConnectionFactory::new(url, self.config.stress_query.as_str())
                    .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))?;
                tracing::info!(database = %factory.describe(), "Database target configured");
                Ok(Arc::new(factory))
            }
        }
    }
}
