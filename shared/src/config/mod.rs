//! Configuration of a datasource instance.
//!
//! Settings come from `LAKEGLASS_DB_*` environment variables or from the
//! host's instance JSON and are validated before an instance is built.

pub mod connection;
pub mod datasource;

pub use connection::ConnectionSettings;
pub use datasource::{AuthMethod, DatasourceSettings};

use thiserror::Error;

/// Errors that prevent a datasource instance from being configured.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is empty.
    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    /// The port is not a valid TCP port.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// The HTTP path does not identify a warehouse.
    #[error("invalid HTTP path {0:?}: expected /sql/1.0/warehouses/<id>")]
    InvalidHttpPath(String),

    /// The authentication method is not supported.
    #[error("unknown authentication method: {0}")]
    UnknownAuthMethod(String),

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// A numeric setting could not be parsed.
    #[error("invalid value {value:?} for setting {name}")]
    InvalidSetting {
        /// Setting name.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// Reads `key` of a JSON object as text; numbers and booleans are rendered.
pub(crate) fn json_string(object: &serde_json::Value, key: &str) -> Option<String> {
    match object.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
