//! Dashboard query endpoint.

use crate::routes::request_cancellation;
use crate::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use shared::models::{QueryDataRequest, QueryDataResponse};

/// Creates the query routes with application state.
pub fn query_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/query", post(query_data))
        .with_state(state)
}

/// Runs a batch of dashboard queries.
///
/// Always answers 200; failures are reported per `refId` in the response body.
async fn query_data(
    State(state): State<AppState>,
    Json(request): Json<QueryDataRequest>,
) -> Json<QueryDataResponse> {
    let (cancel, _guard) = request_cancellation();
    tracing::debug!(queries = request.queries.len(), "Received query batch");

    let datasource = state.datasource().await;
    Json(datasource.query_data(request, &cancel).await)
}
