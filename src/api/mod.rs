//! API module for HTTP handlers.
//!
//! This module contains route definitions and request/response handlers.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;

pub use dto::{IterationSummaryResponse, RunResponse, StressTestPayload, StressTestResponse};
pub use error::{ApiError, ApiErrorResponse, ValidationError};
pub use handlers::{
    ApiConfig, AppState, DeletedResponse, HealthResponse, create_stress_test, delete_stress_test,
    get_stress_test, health_check, list_stress_tests, run_stress_test, update_stress_test,
};
pub use routes::create_router;
