use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use db_stress_test::api::{ApiConfig, AppState, create_router};
use db_stress_test::infrastructure::{AppConfig, StressTestRegistry, TargetFactory};

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting database stress test service");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            return ExitCode::FAILURE;
        }
    };

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = config.worker_threads {
        builder.worker_threads(threads);
    }

    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "Failed to create tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(serve(config))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "db_stress_test=debug,tower_http=debug".into());
    let json_logs =
        std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    let subscriber = tracing_subscriber::registry().with(filter);
    if json_logs {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(config: AppConfig) -> ExitCode {
    tracing::info!(
        database_mode = ?config.database_mode,
        max_parallelism = config.max_parallelism,
        worker_threads = ?config.worker_threads,
        iteration_timeout = ?config.executor.iteration_timeout,
        max_concurrency = ?config.executor.max_concurrency,
        failure_policy = ?config.executor.failure_policy,
        "Configuration loaded"
    );

    let address = match config.bind_address() {
        Ok(address) => address,
        Err(error) => {
            tracing::error!(%error, "Invalid server address");
            return ExitCode::FAILURE;
        }
    };

    let target = match TargetFactory::new(config.clone()).create() {
        Ok(target) => target,
        Err(error) => {
            tracing::error!("Failed to initialize database target: {}", error);
            return ExitCode::FAILURE;
        }
    };

    let registry = Arc::new(StressTestRegistry::new());
    if config.seed_defaults {
        let seeded = registry.seed_defaults();
        tracing::info!(count = seeded.len(), "Default stress tests registered");
    }

    let state = AppState::with_config(
        registry,
        target,
        config.executor.clone(),
        ApiConfig {
            max_parallelism: config.max_parallelism,
        },
    );
    let application = create_router(state, config.static_dir.as_deref());

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, "Failed to bind to address {}", address);
            return ExitCode::FAILURE;
        }
    };

    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    if let Err(error) = axum::serve(listener, application)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "Server error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Waits for SIGINT or, on Unix, SIGTERM. A handler that cannot be
/// installed is skipped; if none can be, the server runs until killed.
async fn shutdown_signal() {
    let interrupt = async { signal::ctrl_c().await.map(|()| "SIGINT") };

    #[cfg(unix)]
    let terminate = async {
        let mut stream = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        stream.recv().await;
        Ok::<_, std::io::Error>("SIGTERM")
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<&'static str>>();

    let received = tokio::select! {
        Ok(name) = interrupt => name,
        Ok(name) = terminate => name,
        else => {
            tracing::warn!("No shutdown signal handler could be installed");
            std::future::pending::<&'static str>().await
        }
    };

    tracing::info!(signal = received, "Shutdown signal received, draining connections");
}
