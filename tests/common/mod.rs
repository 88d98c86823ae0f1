//! Common test helpers for integration tests.
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, and not every file uses every helper.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use db_stress_test::api::{ApiConfig, AppState, StressTestPayload};
use db_stress_test::application::ExecutorConfig;
use db_stress_test::infrastructure::{StressTestRegistry, StubConnectionFactory};

// =============================================================================
// AppState Creation Helpers
// =============================================================================

/// Creates an `AppState` over an empty registry and an instant stub target.
pub fn create_test_app_state() -> AppState {
    create_app_state_with(StubConnectionFactory::new(), ExecutorConfig::default())
}

/// Creates an `AppState` over the four bootstrap definitions.
pub fn create_seeded_app_state() -> AppState {
    let state = create_test_app_state();
    state.registry.seed_defaults();
    state
}

/// Creates an `AppState` over an empty registry with the given target and settings.
pub fn create_app_state_with(stub: StubConnectionFactory, config: ExecutorConfig) -> AppState {
    AppState::with_config(
        Arc::new(StressTestRegistry::new()),
        Arc::new(stub),
        config,
        ApiConfig::default(),
    )
}

// =============================================================================
// Request Helpers
// =============================================================================

/// Builds a create or update body.
pub fn payload(name: &str, parallel: u32) -> StressTestPayload {
    StressTestPayload {
        name: name.to_string(),
        parallel,
        ..StressTestPayload::default()
    }
}

/// Builds a request with an optional JSON body.
pub fn json_request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Reads a response body as JSON.
pub async fn body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
