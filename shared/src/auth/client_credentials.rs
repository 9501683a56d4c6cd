//! OAuth2 client-credentials exchange with a cached, self-refreshing token.

use super::AuthError;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Upper bound on a single token exchange.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_DELTA: Duration = Duration::from_secs(10);

/// Parameters of the client-credentials exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentialsConfig {
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Token endpoint URL.
    pub token_url: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for ClientCredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// A fetched token and when it stops being usable.
struct CachedToken {
    authorization: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn from_response(response: TokenResponse) -> Self {
        let scheme = match response.token_type.as_deref() {
            None | Some("") => "Bearer",
            Some(kind) if kind.eq_ignore_ascii_case("bearer") => "Bearer",
            Some(kind) => kind,
        };
        Self {
            authorization: format!("{scheme} {}", response.access_token),
            // An expiry past what `Instant` can represent never expires.
            expires_at: response
                .expires_in
                .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs))),
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at
            .map_or(true, |expires_at| Instant::now() + EXPIRY_DELTA < expires_at)
    }
}

/// Client-credentials authenticator.
///
/// The token source is created on first use. Calls serialize on one lock so at
/// most one exchange is in flight; later calls reuse the cached token until it
/// is about to expire.
pub struct ClientCredentials {
    config: ClientCredentialsConfig,
    http: reqwest::Client,
    source: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    /// Creates an authenticator; no exchange happens until the first request.
    #[must_use]
    pub fn new(config: ClientCredentialsConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            config,
            http,
            source: Mutex::new(None),
        }
    }

    /// Returns the exchange parameters.
    #[must_use]
    pub const fn config(&self) -> &ClientCredentialsConfig {
        &self.config
    }

    /// Returns an `Authorization` header value, exchanging credentials if the
    /// cached token is missing or expired.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExchange`] if the token endpoint cannot be
    /// reached or rejects the credentials.
    pub async fn authorization(&self) -> Result<String, AuthError> {
        let mut source = self.source.lock().await;
        if let Some(token) = source.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.authorization.clone());
        }

        tracing::debug!(token_url = %self.config.token_url, "Token fetching started");
        let token = self.exchange().await.inspect_err(|e| {
            tracing::error!(error = %e, "Token fetching failed");
        })?;
        tracing::debug!("Token fetched successfully");

        let authorization = token.authorization.clone();
        *source = Some(token);
        Ok(authorization)
    }

    async fn exchange(&self) -> Result<CachedToken, AuthError> {
        let mut form = vec![("grant_type", "client_credentials".to_string())];
        if !self.config.scopes.is_empty() {
            form.push(("scope", self.config.scopes.join(" ")));
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("invalid token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(AuthError::TokenExchange(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        Ok(CachedToken::from_response(token))
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
