//! Integration tests for dashboard query batches.
//!
//! Tests cover:
//! - Macro expansion before execution
//! - Setup statements running ahead of the final query
//! - Per-query error isolation
//! - Long to wide pivoting

use axum::http::StatusCode;
use serde_json::{json, Value};
use shared::engine::ExecError;
use shared::models::{ColumnMeta, RowSet};

use super::common::{one, post_json, test_app, FakeWarehouse};

fn query(ref_id: &str, sql: &str) -> Value {
    json!({
        "refId": ref_id,
        "timeRange": {"from": "2024-01-01T00:00:00Z", "to": "2024-01-02T00:00:00Z"},
        "intervalMs": 60000,
        "rawSqlQuery": sql
    })
}

fn series() -> RowSet {
    RowSet::new(vec![
        ColumnMeta::new("time", "TIMESTAMP"),
        ColumnMeta::new("host", "STRING"),
        ColumnMeta::new("value", "DOUBLE"),
    ])
    .with_row([Some("2024-01-01T00:00:00Z"), Some("a"), Some("1.0")])
    .with_row([Some("2024-01-01T00:00:00Z"), Some("b"), Some("2.0")])
    .with_row([Some("2024-01-01T00:01:00Z"), Some("a"), Some("3.0")])
}

#[tokio::test]
async fn test_query_expands_macros() {
    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_json(
        app,
        "/api/v1/query",
        json!({"queries": [query("A", "SELECT 1 FROM t WHERE $__timeFilter(ts)")]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(response["results"]["A"]["error"].is_null());
    assert_eq!(
        warehouse.statements().last().unwrap(),
        "SELECT 1 FROM t WHERE ts BETWEEN '2024-01-01 00:00:00' AND '2024-01-02 00:00:00'"
    );

    let frame = &response["results"]["A"]["frames"][0];
    assert_eq!(frame["name"], "response");
    assert_eq!(frame["fields"][0]["name"], "1");
    assert_eq!(frame["fields"][0]["type"], "number");
    assert_eq!(frame["fields"][0]["values"], json!([1.0]));
}

#[tokio::test]
async fn test_setup_statements_run_before_query() {
    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, _response) = post_json(
        app,
        "/api/v1/query",
        json!({"queries": [query("A", "SET a = 1; USE sales; SELECT 1;")]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let statements = warehouse.statements();
    assert_eq!(
        statements[statements.len() - 3..],
        ["SET a = 1", "USE sales", "SELECT 1"]
    );
}

#[tokio::test]
async fn test_failures_are_isolated_per_ref_id() {
    let warehouse = FakeWarehouse::new(|sql| {
        if sql.contains("missing_table") {
            Err(ExecError::Engine {
                code: Some("TABLE_OR_VIEW_NOT_FOUND".to_string()),
                message: "Table or view not found: missing_table".to_string(),
            })
        } else {
            Ok(one())
        }
    });
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_json(
        app,
        "/api/v1/query",
        json!({"queries": [
            query("A", "SELECT 1"),
            query("B", "SELECT * FROM missing_table"),
            query("C", "  ;  "),
        ]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = &response["results"];
    assert!(results["A"]["error"].is_null());
    assert_eq!(results["A"]["frames"].as_array().unwrap().len(), 1);
    assert_eq!(
        results["B"]["error"],
        "Table or view not found: missing_table"
    );
    assert_eq!(results["C"]["error"], "query is empty");
}

#[tokio::test]
async fn test_long_to_wide_pivot() {
    let warehouse = FakeWarehouse::new(|sql| {
        if sql == "SELECT 1" {
            Ok(one())
        } else {
            Ok(series())
        }
    });
    let (app, _state) = test_app(&warehouse).await;

    let mut panel = query("A", "SELECT time, host, value FROM metrics");
    panel["querySettings"] = json!({"convertLongToWide": true, "fillMode": 2, "fillValue": 0.0});

    let (status, response) = post_json(app, "/api/v1/query", json!({"queries": [panel]})).await;
    assert_eq!(status, StatusCode::OK);

    let fields = response["results"]["A"]["frames"][0]["fields"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0]["type"], "time");
    assert_eq!(fields[1]["labels"], json!({"host": "a"}));
    assert_eq!(fields[1]["values"], json!([1.0, 3.0]));
    assert_eq!(fields[2]["labels"], json!({"host": "b"}));
    assert_eq!(fields[2]["values"], json!([2.0, 0.0]));
}

#[tokio::test]
async fn test_empty_batch() {
    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_json(app, "/api/v1/query", json!({"queries": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["results"], json!({}));
}

#[tokio::test]
async fn test_bad_time_range_fails_only_its_query() {
    let warehouse = FakeWarehouse::healthy();
    let (app, _state) = test_app(&warehouse).await;

    let mut broken = query("B", "SELECT 2");
    broken["timeRange"] = json!({"from": "yesterday", "to": "now"});

    let (status, response) = post_json(
        app,
        "/api/v1/query",
        json!({"queries": [query("A", "SELECT 1"), broken]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = &response["results"];
    assert!(results["A"]["error"].is_null());
    assert_eq!(results["A"]["frames"].as_array().unwrap().len(), 1);
    assert!(results["B"]["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid query"));
    assert!(!warehouse.statements().iter().any(|s| s == "SELECT 2"));
}
