//! Shared storage for the most recently seen pass-through token.

use std::sync::{PoisonError, RwLock};

/// Thread-safe holder of a single token.
///
/// Readers proceed concurrently; writers are exclusive. Requests that arrive
/// without a caller identity (internal retries, health checks) fall back to the
/// value stored here.
#[derive(Default)]
pub struct TokenStorage {
    token: RwLock<String>,
}

impl TokenStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored token, or an empty string if none was recorded.
    #[must_use]
    pub fn get(&self) -> String {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the stored token. Empty values are ignored.
    pub fn update(&self, token: &str) {
        if token.is_empty() {
            return;
        }
        let mut current = self.token.write().unwrap_or_else(PoisonError::into_inner);
        token.clone_into(&mut current);
    }
}

impl std::fmt::Debug for TokenStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStorage")
            .field("populated", &!self.get().is_empty())
            .finish()
    }
}
