//! Forwards the calling user's own token to the warehouse.

use super::{identity, AuthError, TokenStorage};
use std::sync::Arc;

/// Pass-through authenticator.
///
/// The token of the call in progress wins and is remembered; calls that carry
/// no token (background work, health checks after a restart) reuse the last
/// one seen.
#[derive(Debug, Clone, Default)]
pub struct PassThrough {
    storage: Arc<TokenStorage>,
}

impl PassThrough {
    /// Creates a pass-through authenticator backed by `storage`.
    #[must_use]
    pub const fn new(storage: Arc<TokenStorage>) -> Self {
        Self { storage }
    }

    /// Returns the shared token storage.
    #[must_use]
    pub fn storage(&self) -> &Arc<TokenStorage> {
        &self.storage
    }

    /// Resolves the token for the current call.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingPassThroughToken`] when neither the call
    /// context nor storage holds a token.
    pub fn token(&self) -> Result<String, AuthError> {
        match identity::current().filter(|token| !token.is_empty()) {
            Some(token) => {
                if self.storage.get() != token {
                    tracing::debug!("Pass-through token updated from call context");
                    self.storage.update(&token);
                }
                Ok(token)
            }
            None => {
                let stored = self.storage.get();
                if stored.is_empty() {
                    Err(AuthError::MissingPassThroughToken)
                } else {
                    Ok(stored)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_token_wins_and_is_stored() {
        let storage = Arc::new(TokenStorage::new());
        storage.update("old");
        let auth = PassThrough::new(Arc::clone(&storage));

        let token = identity::scope(Some("fresh".to_string()), async { auth.token() })
            .await
            .unwrap();

        assert_eq!(token, "fresh");
        assert_eq!(storage.get(), "fresh");
    }

    #[tokio::test]
    async fn test_falls_back_to_storage() {
        let storage = Arc::new(TokenStorage::new());
        storage.update("stored");
        let auth = PassThrough::new(storage);

        assert_eq!(auth.token().unwrap(), "stored");
        let token = identity::scope(Some(String::new()), async { auth.token() })
            .await
            .unwrap();
        assert_eq!(token, "stored");
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_an_error() {
        let auth = PassThrough::default();
        assert!(matches!(auth.token(), Err(AuthError::MissingPassThroughToken)));
    }

    #[tokio::test]
    async fn test_storage_survives_calls_without_context() {
        let storage = Arc::new(TokenStorage::default());
        let auth = PassThrough::new(Arc::clone(&storage));

        identity::scope(Some("user-a".to_string()), async { auth.token() })
            .await
            .unwrap();
        assert_eq!(auth.token().unwrap(), "user-a");
    }
}
