//! HTTP API Layer
//!
//! This crate provides the REST API for driving period closing runs using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Run creation, lifecycle commands and health checks
//! - **Middleware**: Request ids, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent `{ error, message }` error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let engine = ClosingEngine::spawn(store.clone(), ledger.clone(), config.engine_config()?);
//! let state = AppState::new(engine.service(), config, vec![store, ledger]);
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;

use std::sync::Arc;

use axum::{
    http::HeaderName,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use core_kernel::HealthCheckable;
use domain_closing::ClosingService;

use crate::config::ApiConfig;
use crate::handlers::{closing, health};
use crate::middleware::{audit_middleware, REQUEST_ID_HEADER};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: ClosingService,
    pub config: ApiConfig,
    /// Adapters reported by the readiness check
    pub health: Vec<Arc<dyn HealthCheckable>>,
}

impl AppState {
    pub fn new(
        service: ClosingService,
        config: ApiConfig,
        health: Vec<Arc<dyn HealthCheckable>>,
    ) -> Self {
        Self {
            service,
            config,
            health,
        }
    }
}

/// Creates the main API router
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    // Public routes
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    // Closing run routes
    let closing_routes = Router::new()
        .route("/", post(closing::create_run))
        .route("/:id", get(closing::get_run))
        .route("/:id/start", post(closing::start_run))
        .route("/:id/pause", post(closing::pause_run))
        .route("/:id/resume", post(closing::resume_run))
        .route("/:id/advance", post(closing::advance_run));

    let api_routes = Router::new()
        .nest("/closing-runs", closing_routes)
        .layer(axum_middleware::from_fn(audit_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
