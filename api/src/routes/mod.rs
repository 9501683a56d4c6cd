//! API route definitions.
//!
//! This module organizes all HTTP routes for the lakeglass API server.

mod health;
mod query;
mod resources;
mod settings;

pub use health::health_routes;

use crate::state::AppState;
use axum::http::StatusCode;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Error body returned by every API route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type.
    pub error: String,
    /// Detailed error message.
    pub message: String,
}

impl ErrorResponse {
    fn reply(status: StatusCode, error: &str, message: impl ToString) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                error: error.to_string(),
                message: message.to_string(),
            }),
        )
    }
}

/// Creates the datasource routes with application state.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .merge(health::datasource_health_routes(state.clone()))
        .merge(query::query_routes(state.clone()))
        .merge(resources::resource_routes(state.clone()))
        .merge(settings::settings_routes(state))
}

/// Returns a token that is cancelled when the returned guard drops.
///
/// Handlers hold the guard for the lifetime of the request, so a client that
/// disconnects cancels the statements it started.
fn request_cancellation() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}
