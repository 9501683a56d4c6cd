//! Datasource instance settings: where the warehouse lives and how to
//! authenticate against it.

use super::{json_string, ConfigError, ConnectionSettings};
use crate::auth::{
    ClientCredentials, ClientCredentialsConfig, Credential, PassThrough, StaticToken, TokenStorage,
};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use validator::Validate;

const DEFAULT_PORT: u16 = 443;
const M2M_TOKEN_PATH: &str = "/oidc/v1/token";
const M2M_SCOPE: &str = "all-apis";

/// How the datasource authenticates against the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Personal access token.
    #[default]
    Dsn,
    /// OAuth2 client credentials against an external token endpoint.
    #[serde(rename = "oauth2_client_credentials")]
    OAuth2ClientCredentials,
    /// OAuth2 client credentials against the workspace's own token endpoint.
    M2m,
    /// Forward the dashboard user's token.
    #[serde(rename = "oauth2_pass_through")]
    OAuth2PassThrough,
}

impl FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "dsn" => Ok(Self::Dsn),
            "oauth2_client_credentials" => Ok(Self::OAuth2ClientCredentials),
            "m2m" => Ok(Self::M2m),
            "oauth2_pass_through" | "oauth_pass_through" => Ok(Self::OAuth2PassThrough),
            other => Err(ConfigError::UnknownAuthMethod(other.to_string())),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dsn => "dsn",
            Self::OAuth2ClientCredentials => "oauth2_client_credentials",
            Self::M2m => "m2m",
            Self::OAuth2PassThrough => "oauth2_pass_through",
        })
    }
}

/// A field of [`DatasourceSettings`], addressable by environment variable or
/// by instance JSON key.
#[derive(Debug, Clone, Copy)]
enum Field {
    Hostname,
    HttpPath,
    Port,
    AuthMethod,
    Token,
    ClientId,
    ClientSecret,
    ExternalCredentialsUrl,
    OAuthScopes,
}

impl Field {
    const fn env_var(self) -> &'static str {
        match self {
            Self::Hostname => "LAKEGLASS_DB_HOSTNAME",
            Self::HttpPath => "LAKEGLASS_DB_HTTP_PATH",
            Self::Port => "LAKEGLASS_DB_PORT",
            Self::AuthMethod => "LAKEGLASS_DB_AUTH_METHOD",
            Self::Token => "LAKEGLASS_DB_TOKEN",
            Self::ClientId => "LAKEGLASS_DB_CLIENT_ID",
            Self::ClientSecret => "LAKEGLASS_DB_CLIENT_SECRET",
            Self::ExternalCredentialsUrl => "LAKEGLASS_DB_EXTERNAL_CREDENTIALS_URL",
            Self::OAuthScopes => "LAKEGLASS_DB_OAUTH_SCOPES",
        }
    }

    const fn json_key(self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::HttpPath => "path",
            Self::Port => "port",
            Self::AuthMethod => "authenticationMethod",
            Self::Token => "token",
            Self::ClientId => "clientId",
            Self::ClientSecret => "clientSecret",
            Self::ExternalCredentialsUrl => "externalCredentialsUrl",
            Self::OAuthScopes => "oauthScopes",
        }
    }

    /// Secrets only ever come from the secure JSON map.
    const fn is_secret(self) -> bool {
        matches!(self, Self::Token | Self::ClientSecret)
    }
}

/// Settings of one datasource instance.
///
/// Created from the environment ([`DatasourceSettings::from_env`]) or from the
/// host's `jsonData`/`secureJsonData` pair
/// ([`DatasourceSettings::from_instance_json`]).
#[derive(Clone, PartialEq, Eq, Validate)]
pub struct DatasourceSettings {
    /// Warehouse hostname, optionally with a scheme.
    #[validate(length(min = 1, message = "Hostname cannot be empty"))]
    pub hostname: String,
    /// HTTP path of the warehouse, `/sql/1.0/warehouses/<id>`.
    #[validate(length(min = 1, message = "HTTP path cannot be empty"))]
    pub http_path: String,
    /// Warehouse port.
    pub port: u16,
    /// Selected authentication method.
    pub auth_method: AuthMethod,
    /// Personal access token, for [`AuthMethod::Dsn`].
    pub token: String,
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Token endpoint for [`AuthMethod::OAuth2ClientCredentials`].
    pub external_credentials_url: String,
    /// Requested OAuth2 scopes.
    pub oauth_scopes: Vec<String>,
    /// Pool limits and timeouts.
    pub connection: ConnectionSettings,
}

impl fmt::Debug for DatasourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceSettings")
            .field("hostname", &self.hostname)
            .field("http_path", &self.http_path)
            .field("port", &self.port)
            .field("auth_method", &self.auth_method)
            .field("token", &redacted(&self.token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("external_credentials_url", &self.external_credentials_url)
            .field("oauth_scopes", &self.oauth_scopes)
            .field("connection", &self.connection)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

impl DatasourceSettings {
    /// Creates settings for a personal-access-token datasource with default
    /// connection settings.
    #[must_use]
    pub fn with_token(
        hostname: impl Into<String>,
        http_path: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            http_path: http_path.into(),
            port: DEFAULT_PORT,
            auth_method: AuthMethod::Dsn,
            token: token.into(),
            client_id: String::new(),
            client_secret: String::new(),
            external_credentials_url: String::new(),
            oauth_scopes: Vec::new(),
            connection: ConnectionSettings::default(),
        }
    }

    /// Loads settings from `LAKEGLASS_DB_*` environment variables, reading a
    /// `.env` file first if present.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a value cannot be parsed. Required fields
    /// are checked by [`DatasourceSettings::validate_settings`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let connection = ConnectionSettings::from_env()?;
        Self::from_source(|field| std::env::var(field.env_var()).ok(), connection)
    }

    /// Loads settings from the host's instance JSON. `token` and
    /// `clientSecret` are read from `secure_json_data` only.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a value cannot be parsed.
    pub fn from_instance_json(
        json_data: &serde_json::Value,
        secure_json_data: &serde_json::Value,
    ) -> Result<Self, ConfigError> {
        let connection = ConnectionSettings::from_json(json_data)?;
        Self::from_source(
            |field| {
                let source = if field.is_secret() {
                    secure_json_data
                } else {
                    json_data
                };
                json_string(source, field.json_key())
            },
            connection,
        )
    }

    fn from_source<F>(get: F, connection: ConnectionSettings) -> Result<Self, ConfigError>
    where
        F: Fn(Field) -> Option<String>,
    {
        let text = |field| get(field).map(|v| v.trim().to_string()).unwrap_or_default();

        let port = match text(Field::Port).as_str() {
            "" => DEFAULT_PORT,
            raw => raw
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.to_string()))?,
        };

        Ok(Self {
            hostname: text(Field::Hostname),
            http_path: text(Field::HttpPath),
            port,
            auth_method: text(Field::AuthMethod).parse()?,
            token: text(Field::Token),
            client_id: text(Field::ClientId),
            client_secret: text(Field::ClientSecret),
            external_credentials_url: text(Field::ExternalCredentialsUrl),
            oauth_scopes: text(Field::OAuthScopes)
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
            connection,
        })
    }

    /// Checks that every field required by the selected method is present.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - hostname or HTTP path is empty
    /// - the HTTP path does not name a warehouse
    /// - a credential field required by the authentication method is empty
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.warehouse_id()?;

        let required: Vec<(&'static str, &str)> = match self.auth_method {
            AuthMethod::Dsn => vec![("token", self.token.as_str())],
            AuthMethod::OAuth2ClientCredentials => vec![
                ("clientId", self.client_id.as_str()),
                ("clientSecret", self.client_secret.as_str()),
                ("externalCredentialsUrl", self.external_credentials_url.as_str()),
            ],
            AuthMethod::M2m => vec![
                ("clientId", self.client_id.as_str()),
                ("clientSecret", self.client_secret.as_str()),
            ],
            AuthMethod::OAuth2PassThrough => Vec::new(),
        };
        match required.into_iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(ConfigError::MissingField(name)),
            None => Ok(()),
        }
    }

    /// Returns the base URL of the warehouse REST API.
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.hostname.contains("://") {
            self.hostname.trim_end_matches('/').to_string()
        } else {
            format!("https://{}:{}", self.hostname, self.port)
        }
    }

    /// Extracts the warehouse id from the HTTP path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHttpPath`] unless the path has the form
    /// `/sql/<version>/warehouses/<id>`.
    pub fn warehouse_id(&self) -> Result<&str, ConfigError> {
        let segments: Vec<&str> = self.http_path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["sql", _, "warehouses", id] if !id.is_empty() => Ok(*id),
            _ => Err(ConfigError::InvalidHttpPath(self.http_path.clone())),
        }
    }

    /// Builds the credential for the selected authentication method.
    #[must_use]
    pub fn credential(&self) -> Credential {
        match self.auth_method {
            AuthMethod::Dsn => Credential::Static(StaticToken::new(self.token.clone())),
            AuthMethod::OAuth2ClientCredentials => {
                Credential::ClientCredentials(ClientCredentials::new(ClientCredentialsConfig {
                    client_id: self.client_id.clone(),
                    client_secret: self.client_secret.clone(),
                    token_url: self.external_credentials_url.clone(),
                    scopes: self.oauth_scopes.clone(),
                }))
            }
            AuthMethod::M2m => {
                Credential::ClientCredentials(ClientCredentials::new(ClientCredentialsConfig {
                    client_id: self.client_id.clone(),
                    client_secret: self.client_secret.clone(),
                    token_url: format!("{}{M2M_TOKEN_PATH}", self.base_url()),
                    scopes: vec![M2M_SCOPE.to_string()],
                }))
            }
            AuthMethod::OAuth2PassThrough => {
                Credential::PassThrough(PassThrough::new(Arc::new(TokenStorage::new())))
            }
        }
    }
}
