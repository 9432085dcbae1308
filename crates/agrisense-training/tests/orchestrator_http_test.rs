//! End-to-end orchestrator runs against a mock HTTP backend.

use agrisense_training::{
    ApiConfig, HttpBackend, OrchestratorConfig, StageStatus, TrainingOrchestrator,
};
use mockito::Matcher;
use serde_json::json;

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval_ms: 20,
        max_attempts: 3,
        tick_interval_ms: 5,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(server: &mockito::Server) -> TrainingOrchestrator<HttpBackend> {
    let api = ApiConfig::with_base_url(format!("{}/api", server.url()));
    TrainingOrchestrator::new(HttpBackend::new(&api).unwrap(), fast_config()).unwrap()
}

#[tokio::test]
async fn test_accepted_job_completes_through_status_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let submit = server
        .mock("POST", "/api/models/train/")
        .match_body(Matcher::PartialJson(json!({"dataset_id": "ds-123", "algorithm": "xgboost"})))
        .with_status(201)
        .with_body(r#"{"name": "xgboost_ds-123", "algorithm": "xgboost"}"#)
        .create_async()
        .await;
    let status = server
        .mock("GET", "/api/models/xgboost_ds-123/status/")
        .with_status(200)
        .with_body(
            json!({
                "status": "completed",
                "overall_progress": 100,
                "metrics": {"accuracy": 0.94, "precision": 0.93, "recall": 0.95, "f1_score": 0.94}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let state = orchestrator(&server).start("xgboost", "ds-123").wait().await;

    assert!(!state.loading);
    assert!(state.error.is_none(), "unexpected error: {:?}", state.error);
    let result = state.result.unwrap();
    assert_eq!(result.job_name, "xgboost_ds-123");
    assert_eq!(result.algorithm, "xgboost");
    assert!((result.accuracy - 0.94).abs() < 1e-9);
    let progress = state.progress.unwrap();
    assert_eq!(progress.overall_percent, 100);
    assert!(progress.stages.iter().all(|s| s.status == StageStatus::Completed));

    submit.assert_async().await;
    status.assert_async().await;
}

#[tokio::test]
async fn test_inline_error_is_reported_without_polling() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/models/train/")
        .with_status(400)
        .with_body(r#"{"error": "Dataset not found"}"#)
        .create_async()
        .await;
    let status = server
        .mock("GET", Matcher::Regex("/status/$".to_string()))
        .expect(0)
        .create_async()
        .await;

    let state = orchestrator(&server).start("random_forest", "ds-404").wait().await;

    assert_eq!(state.error.as_deref(), Some("Dataset not found"));
    assert!(state.result.is_none());
    status.assert_async().await;
}

#[tokio::test]
async fn test_status_errors_exhaust_attempt_budget() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/models/train/")
        .with_status(201)
        .with_body(r#"{"jobId": "job-9"}"#)
        .create_async()
        .await;
    let status = server
        .mock("GET", "/api/models/job-9/status/")
        .with_status(500)
        .with_body(r#"{"error": "progress file unreadable"}"#)
        .expect(3)
        .create_async()
        .await;

    let state = orchestrator(&server).start("xgboost", "ds-1").wait().await;

    assert_eq!(
        state.error.as_deref(),
        Some("Training timed out after 3 status checks. Please try again.")
    );
    assert_eq!(state.progress.map(|p| p.overall_percent), Some(100));
    status.assert_async().await;
}
