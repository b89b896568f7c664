//! Period Closing - API Server Binary
//!
//! This binary starts the closing engine and the HTTP API in front of it.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin closing-api
//!
//! # Run with environment variables
//! CLOSING_PORT=8080 CLOSING_DATABASE_URL=postgres://... cargo run --bin closing-api
//! ```
//!
//! # Environment Variables
//!
//! * `CLOSING_HOST` - Server host (default: 0.0.0.0)
//! * `CLOSING_PORT` - Server port (default: 8080)
//! * `CLOSING_DATABASE_URL` - PostgreSQL connection string
//! * `CLOSING_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `CLOSING_LOG_JSON` - Emit JSON log lines (default: false)
//! * `CLOSING_BATCH_SIZE` - Units of one run in flight at once (default: 4)
//! * `CLOSING_WORKER_COUNT` - Worker tasks (default: 4)
//! * `CLOSING_MAX_DELIVERIES` - Deliveries per unit on transient failures (default: 3)
//! * `CLOSING_BACKGROUND` - Use the worker pool; `false` runs units inline (default: true)
//! * `CLOSING_SCHEDULER_ACTIVE` - Claim units at all (default: true)
//! * `CLOSING_AMOUNT_PRECISION` - Decimal places of posted amounts (default: 2)
//! * `CLOSING_DIMENSIONS` - Comma-separated custom accounting dimensions
//! * `CLOSING_DEFAULT_POLICY` - `dual` or `profit_and_loss_only` (default: dual)

use std::net::SocketAddr;
use std::sync::Arc;

use core_kernel::HealthCheckable;
use domain_closing::ClosingEngine;
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresClosingStore, PostgresLedger};
use interface_api::{config::ApiConfig, create_router, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main entry point for the API server.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - Database connection or migrations fail
/// - Server fails to bind to the configured address
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env()?;
    let engine_config = config.engine_config()?;

    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        batch_size = engine_config.batch_size,
        workers = engine_config.worker_count,
        dispatch = ?engine_config.dispatch,
        "Starting Period Closing API Server"
    );

    tracing::info!("Connecting to database...");
    let pool = create_pool(DatabaseConfig::new(config.database_url.clone())).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database ready");

    let store = Arc::new(PostgresClosingStore::new(pool.clone()));
    let ledger = Arc::new(PostgresLedger::new(pool));
    let engine = ClosingEngine::spawn(store.clone(), ledger.clone(), engine_config);

    let health: Vec<Arc<dyn HealthCheckable>> = vec![
        store as Arc<dyn HealthCheckable>,
        ledger as Arc<dyn HealthCheckable>,
    ];
    let app = create_router(AppState::new(engine.service(), config.clone(), health));

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// In-flight requests complete before the process exits; units still
/// running stay `Running` in the database.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
