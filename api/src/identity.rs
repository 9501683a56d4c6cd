//! Call-scoped identity propagation.

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use shared::auth::identity;

/// Runs the rest of the request with the caller's bearer token as the
/// call-scoped identity, so pass-through credentials can forward it.
pub async fn propagate_identity(request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(identity::bearer_from_header);

    identity::scope(token, next.run(request)).await
}
