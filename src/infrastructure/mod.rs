//! Infrastructure module for external services.
//!
//! This module contains the definition registry, the database targets and
//! the configuration that selects between them.

pub mod config;
pub mod database;
pub mod factory;
pub mod registry;
pub mod stub;

pub use config::{AppConfig, AppConfigBuilder, ConfigurationError, DatabaseMode};
pub use database::{
    ConnectionFactory, DEFAULT_STRESS_QUERY, QueryError, QueryStats, SqlxConnectionFactory,
};
pub use factory::{FactoryError, TargetFactory};
pub use registry::{RegistryError, StressTestRegistry};
pub use stub::{StubConnectionFactory, StubFailure};
