//! Common test utilities and helpers for integration tests.
//!
//! This module provides a scripted warehouse, test app setup and HTTP request
//! helpers shared by all integration tests.

use api::{create_router, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use shared::config::ConnectionSettings;
use shared::datasource::Datasource;
use shared::engine::{Connection, Connector, ExecError};
use shared::models::{ColumnMeta, RowSet};
use shared::tokio_util::sync::CancellationToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Responder = dyn Fn(&str) -> Result<RowSet, ExecError> + Send + Sync;

/// A warehouse that answers every statement through a closure.
#[derive(Clone)]
pub struct FakeWarehouse {
    responder: Arc<Responder>,
    statements: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl FakeWarehouse {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<RowSet, ExecError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            statements: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A warehouse where every statement returns a single `1`.
    pub fn healthy() -> Self {
        Self::new(|_| Ok(one()))
    }

    /// Every statement the warehouse has seen, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for FakeWarehouse {
    async fn query(&self, sql: &str, _cancel: &CancellationToken) -> Result<RowSet, ExecError> {
        self.statements.lock().unwrap().push(sql.to_string());
        (self.responder)(sql)
    }

    async fn exec(&self, sql: &str, cancel: &CancellationToken) -> Result<(), ExecError> {
        self.query(sql, cancel).await.map(|_| ())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeWarehouse {
    async fn connect(
        &self,
        _settings: &ConnectionSettings,
    ) -> Result<Arc<dyn Connection>, ExecError> {
        Ok(Arc::new(self.clone()))
    }
}

/// The result of `SELECT 1`.
pub fn one() -> RowSet {
    RowSet::new(vec![ColumnMeta::new("1", "INT")]).with_row([Some("1")])
}

/// Creates a test router on top of `warehouse`.
///
/// # Returns
///
/// A tuple containing the configured router and the app state.
pub async fn test_app(warehouse: &FakeWarehouse) -> (Router, AppState) {
    let datasource =
        Datasource::with_connector(Arc::new(warehouse.clone()), ConnectionSettings::default())
            .await
            .unwrap();
    let state = AppState::new(datasource);
    let router = create_router(state.clone());
    (router, state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();

    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    (status, json)
}

/// Helper to make a POST request with JSON body.
pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
    )
    .await
}

/// Helper to make a POST request with a raw body.
pub async fn post_raw(app: Router, uri: &str, body: &'static str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body))
            .unwrap(),
    )
    .await
}

/// Helper to make a PUT request with JSON body and optional bearer token.
pub async fn put_json(
    app: Router,
    uri: &str,
    body: Value,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    send(
        app,
        builder
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
    )
    .await
}

/// Helper to make a GET request.
pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}
