//! Integration tests for the catalog introspection resources.

use axum::http::StatusCode;
use serde_json::json;
use shared::models::{ColumnMeta, RowSet};

use super::common::{one, post_json, post_raw, test_app, FakeWarehouse};

fn catalog_warehouse() -> FakeWarehouse {
    FakeWarehouse::new(|sql| {
        let rows = match sql {
            "SHOW CATALOGS" => RowSet::new(vec![ColumnMeta::new("catalog", "STRING")])
                .with_row([Some("main")])
                .with_row([Some("samples")]),
            "SHOW TABLES IN main.sales" => RowSet::new(vec![
                ColumnMeta::new("database", "STRING"),
                ColumnMeta::new("tableName", "STRING"),
                ColumnMeta::new("isTemporary", "BOOLEAN"),
            ])
            .with_row([Some("sales"), Some("orders"), Some("false")]),
            "DESCRIBE TABLE main.sales.orders" => RowSet::new(vec![
                ColumnMeta::new("col_name", "STRING"),
                ColumnMeta::new("data_type", "STRING"),
            ])
            .with_row([Some("id"), Some("bigint")])
            .with_row([Some("placed_at"), Some("timestamp")]),
            "SELECT current_catalog(), current_schema()" => RowSet::new(vec![
                ColumnMeta::new("current_catalog()", "STRING"),
                ColumnMeta::new("current_schema()", "STRING"),
            ])
            .with_row([Some("main"), Some("default")]),
            _ => one(),
        };
        Ok(rows)
    })
}

#[tokio::test]
async fn test_catalogs_with_empty_body() {
    let warehouse = catalog_warehouse();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_raw(app, "/api/v1/resources/catalogs", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!(["main", "samples"]));
}

#[tokio::test]
async fn test_tables_in_schema() {
    let warehouse = catalog_warehouse();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_json(
        app,
        "/api/v1/resources/tables",
        json!({"catalog": "main", "schema": "sales"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!(["orders"]));
}

#[tokio::test]
async fn test_columns_of_table() {
    let warehouse = catalog_warehouse();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_json(
        app,
        "/api/v1/resources/columns",
        json!({"table": "main.sales.orders"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response,
        json!([
            {"name": "id", "type": "bigint"},
            {"name": "placed_at", "type": "timestamp"}
        ])
    );
}

#[tokio::test]
async fn test_defaults() {
    let warehouse = catalog_warehouse();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_raw(app, "/api/v1/resources/defaults", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response,
        json!({"defaultCatalog": "main", "defaultSchema": "default"})
    );
}

#[tokio::test]
async fn test_unknown_resource_is_404() {
    let warehouse = catalog_warehouse();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_raw(app, "/api/v1/resources/functions", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["error"], "not_found");
}

#[tokio::test]
async fn test_unsafe_identifier_is_rejected_before_execution() {
    let warehouse = catalog_warehouse();
    let (app, _state) = test_app(&warehouse).await;
    let before = warehouse.statements().len();

    let (status, response) = post_json(
        app,
        "/api/v1/resources/schemas",
        json!({"catalog": "main; DROP TABLE x"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "invalid_identifier");
    assert_eq!(warehouse.statements().len(), before);
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let warehouse = catalog_warehouse();
    let (app, _state) = test_app(&warehouse).await;

    let (status, response) = post_raw(app, "/api/v1/resources/schemas", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "invalid_body");
}
