//! Integration tests for replacing the datasource settings at runtime.
//!
//! The new instance talks to a wiremock statement API, so these tests also
//! cover the credential each authentication method puts on the wire.

use axum::http::StatusCode;
use serde_json::{json, Value};
use shared::datasource::HealthStatus;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{get, put_json, test_app, FakeWarehouse};

const STATEMENTS: &str = "/api/2.0/sql/statements";

fn select_one() -> Value {
    json!({
        "statement_id": "s1",
        "status": {"state": "SUCCEEDED"},
        "manifest": {"schema": {"columns": [
            {"name": "1", "type_name": "INT", "type_text": "INT"}
        ]}},
        "result": {"data_array": [["1"]]}
    })
}

fn settings(server: &MockServer, auth_method: &str) -> Value {
    json!({
        "jsonData": {
            "hostname": server.uri(),
            "path": "/sql/1.0/warehouses/wh1",
            "authenticationMethod": auth_method
        },
        "secureJsonData": {"token": "dapi-new"}
    })
}

#[tokio::test]
async fn test_replaces_datasource_and_disposes_previous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STATEMENTS))
        .and(header("Authorization", "Bearer dapi-new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(select_one()))
        .mount(&server)
        .await;

    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = put_json(
        app.clone(),
        "/api/v1/settings",
        settings(&server, "dsn"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "applied");
    assert_eq!(response["auth_method"], "dsn");
    assert_eq!(warehouse.closes(), 1);

    // Health now goes to the new warehouse.
    let before = warehouse.statements().len();
    let (status, response) = get(app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "ok");
    assert_eq!(warehouse.statements().len(), before);
    // Startup ping plus health check.
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_in_flight_request_keeps_previous_datasource_open() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STATEMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(select_one()))
        .mount(&server)
        .await;

    let warehouse = FakeWarehouse::healthy();
    let (app, state) = test_app(&warehouse).await;
    let held = state.datasource().await;

    let (status, _response) =
        put_json(app, "/api/v1/settings", settings(&server, "dsn"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(warehouse.closes(), 0);

    // The held instance still serves its request after the swap.
    let cancel = tokio_util::sync::CancellationToken::new();
    let health = held.check_health(&cancel).await;
    assert_eq!(health.status, HealthStatus::Ok);
    assert_eq!(warehouse.closes(), 0);

    drop(held);
    for _ in 0..100 {
        if warehouse.closes() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(warehouse.closes(), 1);
}

#[tokio::test]
async fn test_invalid_settings_keep_previous_datasource() {
    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = put_json(
        app.clone(),
        "/api/v1/settings",
        json!({"jsonData": {"path": "/sql/1.0/warehouses/wh1"}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "invalid_settings");
    assert_eq!(warehouse.closes(), 0);

    let (status, _response) = get(app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unreachable_warehouse_is_502() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STATEMENTS))
        .respond_with(ResponseTemplate::new(403).set_body_string("Invalid access token"))
        .mount(&server)
        .await;

    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) =
        put_json(app, "/api/v1/settings", settings(&server, "dsn"), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(response["error"], "connection_failed");
    assert_eq!(warehouse.closes(), 0);
}

#[tokio::test]
async fn test_pass_through_forwards_caller_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STATEMENTS))
        .and(header("Authorization", "Bearer caller-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(select_one()))
        .expect(1)
        .mount(&server)
        .await;

    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = put_json(
        app,
        "/api/v1/settings",
        settings(&server, "oauth2_pass_through"),
        Some("caller-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["auth_method"], "oauth2_pass_through");
}

#[tokio::test]
async fn test_pass_through_without_caller_defers_ping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STATEMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(select_one()))
        .expect(0)
        .mount(&server)
        .await;

    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, _response) = put_json(
        app,
        "/api/v1/settings",
        settings(&server, "oauth2_pass_through"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
