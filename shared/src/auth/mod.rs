//! Outgoing request authentication.
//!
//! A [`Credential`] is fixed when a datasource instance is created and applied
//! to every physical request sent to the warehouse.

mod client_credentials;
pub mod identity;
mod pass_through;
mod token_storage;

pub use client_credentials::{ClientCredentials, ClientCredentialsConfig};
pub use pass_through::PassThrough;
pub use token_storage::TokenStorage;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use thiserror::Error;

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A static token credential was configured without a token.
    #[error("access token is missing")]
    MissingToken,

    /// Pass-through was configured but no caller token has been seen yet.
    #[error("no pass-through token available: the request carries no user token and none was stored")]
    MissingPassThroughToken,

    /// The OAuth2 token endpoint could not issue a token.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The token cannot be carried in an HTTP header.
    #[error("invalid authorization header: {0}")]
    InvalidHeader(String),
}

/// A personal access token sent as a bearer header.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Creates a static token credential.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("populated", &!self.token.is_empty())
            .finish()
    }
}

/// The authentication strategy of one datasource instance.
#[derive(Debug)]
pub enum Credential {
    /// Fixed personal access token.
    Static(StaticToken),
    /// OAuth2 client-credentials flow, including the machine-to-machine variant.
    ClientCredentials(ClientCredentials),
    /// Forward the dashboard user's token.
    PassThrough(PassThrough),
}

impl Credential {
    /// Adds the `Authorization` header to `request`.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if no token can be obtained or it is not a
    /// valid header value.
    pub async fn authenticate(&self, request: &mut reqwest::Request) -> Result<(), AuthError> {
        let value = match self {
            Self::Static(token) => {
                if token.token.is_empty() {
                    return Err(AuthError::MissingToken);
                }
                format!("Bearer {}", token.token)
            }
            Self::ClientCredentials(credentials) => credentials.authorization().await?,
            Self::PassThrough(pass_through) => format!("Bearer {}", pass_through.token()?),
        };

        let mut header =
            HeaderValue::from_str(&value).map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
        header.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, header);
        Ok(())
    }

    /// Short name of the strategy, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::ClientCredentials(_) => "client_credentials",
            Self::PassThrough(_) => "pass_through",
        }
    }
}
