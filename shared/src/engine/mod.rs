//! Statement execution against the warehouse.
//!
//! [`Connector`] and [`Connection`] are the boundary to the pooled-connection
//! primitive. [`StatementConnector`] implements them over the statement
//! execution REST API and [`ResilientExecutor`] adds session-expiry recovery
//! on top of any implementation.

mod executor;
mod statement;
#[cfg(test)]
pub(crate) mod testing;

pub use executor::{ResilientExecutor, PING_STATEMENT};
pub use statement::{StatementConnection, StatementConnector};

use crate::auth::AuthError;
use crate::config::ConnectionSettings;
use crate::models::RowSet;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Text the engine reports when a session handle is no longer valid.
///
/// This is a substring match on the error text because the engine does not
/// expose a structured code for this condition.
pub const SESSION_EXPIRED_SIGNATURE: &str = "Invalid SessionHandle";

/// Errors raised while executing a statement.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The request could not be authenticated.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The engine rejected or aborted the statement.
    #[error("{message}")]
    Engine {
        /// Engine error code, if reported.
        code: Option<String>,
        /// Engine error message.
        message: String,
    },

    /// The engine answered with an unexpected HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request did not reach the engine or the response was cut off.
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine response could not be decoded.
    #[error("invalid engine response: {0}")]
    Decode(String),

    /// The statement exceeded its deadline.
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the statement.
    #[error("statement cancelled")]
    Cancelled,

    /// A connection could not be created.
    #[error("connection failed: {0}")]
    Connect(String),
}

impl ExecError {
    /// Returns `true` if the error signals an invalid or expired session.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        self.to_string().contains(SESSION_EXPIRED_SIGNATURE)
    }
}

/// A live, pooled connection to the warehouse.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Runs a row-returning statement.
    async fn query(&self, sql: &str, cancel: &CancellationToken) -> Result<RowSet, ExecError>;

    /// Runs a statement and discards any rows.
    async fn exec(&self, sql: &str, cancel: &CancellationToken) -> Result<(), ExecError>;

    /// Releases pooled resources. Later calls may fail.
    async fn close(&self);
}

/// Factory of [`Connection`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Creates a new connection with `settings` applied.
    async fn connect(&self, settings: &ConnectionSettings)
        -> Result<Arc<dyn Connection>, ExecError>;
}
