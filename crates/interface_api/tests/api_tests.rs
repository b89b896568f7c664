//! HTTP API tests against the in-memory closing store and ledger

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use core_kernel::HealthCheckable;
use domain_closing::memory::InMemoryClosingStore;
use domain_closing::{ClosingEngine, PeriodClosingVoucher};
use interface_api::{config::ApiConfig, create_router, AppState};
use test_utils::{LedgerSeedBuilder, VoucherBuilder};

struct TestApp {
    server: TestServer,
    voucher: PeriodClosingVoucher,
    _engine: ClosingEngine,
}

async fn app_with(config: ApiConfig) -> TestApp {
    let voucher = VoucherBuilder::new().build();
    let ledger = Arc::new(
        LedgerSeedBuilder::new()
            .with_standard_accounts()
            .daily_activity(voucher.period)
            .build()
            .into_memory()
            .await,
    );
    let store = Arc::new(InMemoryClosingStore::new());
    store.insert_voucher(voucher.clone()).await;

    let engine = ClosingEngine::spawn(
        store.clone(),
        ledger.clone(),
        config.engine_config().unwrap(),
    );
    let health: Vec<Arc<dyn HealthCheckable>> = vec![
        store as Arc<dyn HealthCheckable>,
        ledger as Arc<dyn HealthCheckable>,
    ];
    let router = create_router(AppState::new(engine.service(), config, health));

    TestApp {
        server: TestServer::new(router).unwrap(),
        voucher,
        _engine: engine,
    }
}

/// Units run on the request task, so every call settles before it returns
async fn inline_app() -> TestApp {
    app_with(ApiConfig {
        background: false,
        ..ApiConfig::default()
    })
    .await
}

impl TestApp {
    async fn create_run(&self, policy: Option<&str>) -> String {
        let response = self
            .server
            .post("/api/v1/closing-runs")
            .json(&json!({ "voucher_id": self.voucher.id.as_uuid(), "policy": policy }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["id"].as_str().unwrap().to_string()
    }

    async fn command(&self, run_id: &str, command: &str) -> axum_test::TestResponse {
        self.server
            .post(&format!("/api/v1/closing-runs/{}/{}", run_id, command))
            .await
    }

    async fn run(&self, run_id: &str) -> Value {
        let response = self.server.get(&format!("/api/v1/closing-runs/{}", run_id)).await;
        response.assert_status_ok();
        response.json::<Value>()
    }
}

// ============================================================================
// Health Tests
// ============================================================================

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let app = inline_app().await;
        let response = app.server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_reports_adapters() {
        let app = inline_app().await;
        let response = app.server.get("/health/ready").await;
        response.assert_status_ok();

        let body = response.json::<Value>();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["adapters"].as_array().unwrap().len(), 2);
    }
}

// ============================================================================
// Closing Run Tests
// ============================================================================

mod closing_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_run_uses_default_policy() {
        let app = inline_app().await;
        let run_id = app.create_run(None).await;

        let run = app.run(&run_id).await;
        assert_eq!(run["status"], "Queued");
        assert_eq!(run["policy"], "dual");
        assert_eq!(run["units"]["queued"], 6);
        assert_eq!(run["opening_units"], 0);
        assert!(run["summary"].is_null());
    }

    #[tokio::test]
    async fn test_create_run_with_explicit_policy() {
        let app = inline_app().await;
        let run_id = app.create_run(Some("profit_and_loss_only")).await;

        let run = app.run(&run_id).await;
        assert_eq!(run["policy"], "profit_and_loss_only");
        assert_eq!(run["units"]["queued"], 3);
    }

    #[tokio::test]
    async fn test_create_run_for_unknown_voucher_is_404() {
        let app = inline_app().await;
        let response = app
            .server
            .post("/api/v1/closing-runs")
            .json(&json!({ "voucher_id": uuid::Uuid::new_v4() }))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"], "not_found");
    }

    #[tokio::test]
    async fn test_create_run_without_voucher_is_rejected() {
        let app = inline_app().await;
        let response = app
            .server
            .post("/api/v1/closing-runs")
            .json(&json!({ "policy": "dual" }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let app = inline_app().await;
        let response = app
            .server
            .get(&format!("/api/v1/closing-runs/{}", uuid::Uuid::new_v4()))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_posts_run_inline() {
        let app = inline_app().await;
        let run_id = app.create_run(None).await;

        let response = app.command(&run_id, "start").await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["outcome"], "posted");
        assert_eq!(body["summary"]["reversing_entries"], 2);
        assert_eq!(body["summary"]["closing_entries"], 1);

        let run = app.run(&run_id).await;
        assert_eq!(run["status"], "Completed");
        assert_eq!(run["units"]["completed"], 6);
        assert!(run["summary"].is_object());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let app = inline_app().await;
        let run_id = app.create_run(Some("profit_and_loss_only")).await;

        let response = app.command(&run_id, "pause").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["paused_units"], 3);

        let run = app.run(&run_id).await;
        assert_eq!(run["status"], "Paused");
        assert_eq!(run["units"]["paused"], 3);

        let start = app.command(&run_id, "start").await;
        start.assert_status_ok();
        assert_eq!(start.json::<Value>()["outcome"], "skipped");

        let resume = app.command(&run_id, "resume").await;
        resume.assert_status_ok();
        assert_eq!(resume.json::<Value>()["outcome"], "posted");
    }

    #[tokio::test]
    async fn test_pause_completed_run_is_conflict() {
        let app = inline_app().await;
        let run_id = app.create_run(None).await;
        app.command(&run_id, "start").await.assert_status_ok();

        let response = app.command(&run_id, "pause").await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<Value>()["error"], "conflict");
    }

    #[tokio::test]
    async fn test_inactive_scheduler_defers() {
        let app = app_with(ApiConfig {
            background: false,
            scheduler_active: false,
            ..ApiConfig::default()
        })
        .await;
        let run_id = app.create_run(None).await;

        let response = app.command(&run_id, "start").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["outcome"], "deferred");

        let run = app.run(&run_id).await;
        assert_eq!(run["status"], "Running");
        assert_eq!(run["units"]["queued"], 6);
    }

    #[tokio::test]
    async fn test_advance_on_completed_run_is_skipped() {
        let app = inline_app().await;
        let run_id = app.create_run(None).await;
        app.command(&run_id, "start").await.assert_status_ok();

        let response = app.command(&run_id, "advance").await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["outcome"], "skipped");
        assert_eq!(body["status"], "Completed");
    }
}
