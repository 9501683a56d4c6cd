//! Integration tests for the liveness and warehouse health endpoints.

use axum::http::StatusCode;
use shared::engine::ExecError;

use super::common::{get, one, test_app, FakeWarehouse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_health_check() {
    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "healthy");
    assert_eq!(response["service"], "lakeglass-api");
}

#[tokio::test]
async fn test_datasource_health_ok() {
    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = get(app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["message"], "Data source is working");
    assert_eq!(warehouse.statements().last().unwrap(), "SELECT 1");
}

#[tokio::test]
async fn test_datasource_health_failure_is_503() {
    // Healthy for the startup ping, down afterwards.
    let down = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&down);
    let warehouse = FakeWarehouse::new(move |_| {
        if flag.load(Ordering::SeqCst) {
            Err(ExecError::Transport("connection refused".to_string()))
        } else {
            Ok(one())
        }
    });
    let (app, _state) = test_app(&warehouse).await;
    down.store(true, Ordering::SeqCst);

    let (status, response) = get(app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response["status"], "error");
    assert_eq!(
        response["message"],
        "SQL Connection Failed: transport error: connection refused"
    );
}
