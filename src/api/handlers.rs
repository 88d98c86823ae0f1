//! HTTP handlers for the stress test API.
//!
//! Each handler decodes the path id and body, calls the registry or the
//! executor, and encodes the result. Failures become [`ApiErrorResponse`].

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Serialize;

use super::dto::{RunResponse, StressTestPayload, StressTestResponse};
use super::error::ApiErrorResponse;
use crate::application::{ExecutorConfig, StressTestExecutor};
use crate::domain::StressTestId;
use crate::infrastructure::{ConnectionFactory, StressTestRegistry};

const DEFAULT_MAX_PARALLELISM: u32 = 1000;

// =============================================================================
// Application Configuration
// =============================================================================

/// Request limits enforced by the handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    /// Largest accepted `parallel` value.
    pub max_parallelism: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_parallelism: DEFAULT_MAX_PARALLELISM,
        }
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
#[derive(Clone)]
pub struct AppState {
    /// Registry of definitions.
    pub registry: Arc<StressTestRegistry>,
    /// Executor running definitions from `registry`.
    pub executor: StressTestExecutor,
    /// Request limits.
    pub config: ApiConfig,
}

impl AppState {
    /// Creates a new `AppState` with default executor settings and limits.
    #[must_use]
    pub fn new(registry: Arc<StressTestRegistry>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self::with_config(
            registry,
            factory,
            ExecutorConfig::default(),
            ApiConfig::default(),
        )
    }

    /// Creates a new `AppState` with custom executor settings and limits.
    #[must_use]
    pub fn with_config(
        registry: Arc<StressTestRegistry>,
        factory: Arc<dyn ConnectionFactory>,
        executor_config: ExecutorConfig,
        config: ApiConfig,
    ) -> Self {
        let executor =
            StressTestExecutor::with_config(Arc::clone(&registry), factory, executor_config);
        Self {
            registry,
            executor,
            config,
        }
    }
}

fn parse_id(raw_id: &str) -> Result<StressTestId, ApiErrorResponse> {
    StressTestId::from_str(raw_id).map_err(|_| ApiErrorResponse::invalid_id())
}

// =============================================================================
// Registry Handlers
// =============================================================================

/// Lists every definition in insertion order.
///
/// # Response
///
/// - **200 OK**: JSON array of definitions
#[allow(clippy::unused_async)]
pub async fn list_stress_tests(State(state): State<AppState>) -> Json<Vec<StressTestResponse>> {
    Json(
        state
            .registry
            .list()
            .iter()
            .map(StressTestResponse::from)
            .collect(),
    )
}

/// Registers a new definition.
///
/// Any `id`, `run` or `duration` in the body is ignored.
///
/// # Response
///
/// - **201 Created**: The stored definition with its assigned id
/// - **400 Bad Request**: Malformed body or `parallel` above the limit
#[allow(clippy::unused_async)]
pub async fn create_stress_test(
    State(state): State<AppState>,
    payload: Result<Json<StressTestPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<StressTestResponse>), ApiErrorResponse> {
    let Json(payload) = payload?;
    let draft = payload.into_draft(state.config.max_parallelism)?;
    let stored = state.registry.add(draft);

    tracing::debug!(id = %stored.id, parallelism = stored.parallelism, "Stress test created");
    Ok((StatusCode::CREATED, Json(StressTestResponse::from(stored))))
}

/// Returns one definition.
///
/// # Response
///
/// - **200 OK**: The definition
/// - **400 Bad Request**: Id is not an integer
/// - **404 Not Found**: No definition has the id
#[allow(clippy::unused_async)]
pub async fn get_stress_test(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<StressTestResponse>, ApiErrorResponse> {
    let id = parse_id(&raw_id)?;
    let stress_test = state.registry.get(id)?;
    Ok(Json(StressTestResponse::from(stress_test)))
}

/// Replaces a definition wholesale.
///
/// Fields missing from the body are reset to their zero values.
///
/// # Response
///
/// - **200 OK**: The definition as stored
/// - **400 Bad Request**: Malformed id or body, body id differing from the path,
///   `parallel` above the limit, or negative `duration`
/// - **404 Not Found**: No definition has the id
#[allow(clippy::unused_async)]
pub async fn update_stress_test(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<StressTestPayload>, JsonRejection>,
) -> Result<Json<StressTestResponse>, ApiErrorResponse> {
    let id = parse_id(&raw_id)?;
    let Json(payload) = payload?;
    let replacement = payload.into_stress_test(id, state.config.max_parallelism)?;
    let stored = state.registry.update(replacement)?;

    tracing::debug!(%id, parallelism = stored.parallelism, "Stress test updated");
    Ok(Json(StressTestResponse::from(stored)))
}

/// Body of a successful delete.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeletedResponse {}

/// Deletes a definition.
///
/// # Response
///
/// - **200 OK**: `{}`
/// - **400 Bad Request**: Id is not an integer
/// - **404 Not Found**: No definition has the id
#[allow(clippy::unused_async)]
pub async fn delete_stress_test(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiErrorResponse> {
    let id = parse_id(&raw_id)?;
    state.registry.remove(id)?;

    tracing::debug!(%id, "Stress test deleted");
    Ok(Json(DeletedResponse {}))
}

// =============================================================================
// POST /stress_tests/{id}/run Handler
// =============================================================================

/// Runs a definition and returns it with the new run fields.
///
/// The request is held until every iteration has finished. If the client
/// goes away first, the remaining iterations are aborted and nothing is
/// recorded.
///
/// # Response
///
/// - **200 OK**: The updated definition plus an `iterations` summary
/// - **400 Bad Request**: Id is not an integer
/// - **404 Not Found**: No definition has the id
/// - **500 Internal Server Error**: Every iteration failed under the strict policy
pub async fn run_stress_test(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<RunResponse>, ApiErrorResponse> {
    let id = parse_id(&raw_id)?;
    let outcome = state.executor.run(id).await?;
    Ok(Json(RunResponse::from(&outcome)))
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check endpoint.
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// =============================================================================
// Tests
// =============================================================================
