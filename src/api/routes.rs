//! Route configuration for the stress test API.
//!
//! # Routes
//!
//! | Method | Path | Handler | Description |
//! |--------|------|---------|-------------|
//! | GET | /stress_tests | `list_stress_tests` | List definitions |
//! | POST | /stress_tests | `create_stress_test` | Register a definition |
//! | GET | /stress_tests/{id} | `get_stress_test` | Get one definition |
//! | POST | /stress_tests/{id} | `update_stress_test` | Replace a definition |
//! | DELETE | /stress_tests/{id} | `delete_stress_test` | Delete a definition |
//! | POST | /stress_tests/{id}/run | `run_stress_test` | Run a definition |
//! | GET | /health | `health_check` | Health check endpoint |
//! | GET | / | `redirect_to_static` | Redirect to the web UI |
//! | GET | /static/* | `ServeDir` | Static files |

use std::path::Path;

use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, create_stress_test, delete_stress_test, get_stress_test, health_check,
    list_stress_tests, run_stress_test, update_stress_test,
};

/// Redirects the root to the web UI.
#[allow(clippy::unused_async)]
pub async fn redirect_to_static() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/static/")])
}

/// Creates the Axum router with all API routes.
///
/// When `static_dir` is given, its files are served under `/static/` and
/// `/` redirects there.
///
/// # Example
///
/// ```rust,ignore
/// let state = AppState::new(registry, factory);
/// let router = create_router(state, Some(Path::new("web")));
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
/// axum::serve(listener, router).await?;
/// ```
pub fn create_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route(
            "/stress_tests",
            get(list_stress_tests).post(create_stress_test),
        )
        .route(
            "/stress_tests/{id}",
            get(get_stress_test)
                .post(update_stress_test)
                .delete(delete_stress_test),
        )
        .route("/stress_tests/{id}/run", post(run_stress_test))
        .route("/health", get(health_check));

    let router = match static_dir {
        Some(directory) => router
            .route("/", get(redirect_to_static))
            .nest_service("/static", ServeDir::new(directory)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
