//! Catalog introspection endpoints used by the query editor.

use crate::routes::{request_cancellation, ErrorResponse};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use shared::datasource::ResourceError;

/// Creates the resource routes with application state.
pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/resources/{path}", post(call_resource))
        .with_state(state)
}

async fn call_resource(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let (cancel, _guard) = request_cancellation();
    let datasource = state.datasource().await;

    datasource
        .call_resource(&path, &body, &cancel)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::debug!(path = %path, error = %e, "Resource call failed");
            let (status, kind) = classify(&e);
            ErrorResponse::reply(status, kind, e)
        })
}

fn classify(error: &ResourceError) -> (StatusCode, &'static str) {
    match error {
        ResourceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ResourceError::InvalidIdentifier(_) => (StatusCode::BAD_REQUEST, "invalid_identifier"),
        ResourceError::InvalidBody(_) => (StatusCode::BAD_REQUEST, "invalid_body"),
        ResourceError::Exec(_) => (StatusCode::INTERNAL_SERVER_ERROR, "execution_error"),
    }
}
