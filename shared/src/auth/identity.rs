//! Call-scoped caller identity.
//!
//! The HTTP layer places the inbound bearer token into a task-local value for
//! the duration of the request. Pass-through credentials read it back when they
//! authenticate an outgoing request made on the same task.

use std::future::Future;

tokio::task_local! {
    static IDENTITY: Option<String>;
}

/// Runs `future` with `token` as the caller identity.
pub async fn scope<F>(token: Option<String>, future: F) -> F::Output
where
    F: Future,
{
    IDENTITY.scope(token, future).await
}

/// Returns the caller identity of the current task, if any.
#[must_use]
pub fn current() -> Option<String> {
    IDENTITY.try_with(Clone::clone).ok().flatten()
}

/// Extracts the token from an `Authorization` header value.
///
/// Accepts both `Bearer <token>` and a bare token. Blank values yield `None`.
#[must_use]
pub fn bearer_from_header(value: &str) -> Option<String> {
    let value = value.trim();
    let token = match value.get(..6) {
        Some(scheme)
            if scheme.eq_ignore_ascii_case("bearer")
                && value[6..].chars().next().map_or(true, char::is_whitespace) =>
        {
            value[6..].trim()
        }
        _ => value,
    };
    (!token.is_empty()).then(|| token.to_string())
}
