//! Health check endpoints.
//!
//! `/health` reports that the process is up. `/api/v1/health` pings the
//! warehouse through the current datasource.

use crate::routes::request_cancellation;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use shared::datasource::{HealthCheckResult, HealthStatus};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status (always "healthy" if reachable).
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Creates the health check routes.
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Creates the warehouse health route.
pub fn datasource_health_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(datasource_health))
        .with_state(state)
}

/// Health check handler.
///
/// Returns a simple JSON response indicating the service is healthy.
/// This endpoint is intended for use by load balancers and monitoring systems.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "lakeglass-api",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Runs `SELECT 1` on the warehouse. Replies 503 when it fails.
async fn datasource_health(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthCheckResult>) {
    let (cancel, _guard) = request_cancellation();
    let result = state.datasource().await.check_health(&cancel).await;
    (health_status_code(result.status), Json(result))
}

fn health_status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
    }
}
