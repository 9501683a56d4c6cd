//! The datasource instance: turns dashboard queries into warehouse statements
//! and statement results into frames.
//!
//! A [`Datasource`] owns one [`ResilientExecutor`] and is immutable once built.
//! Settings changes are handled by building a new instance and disposing the
//! old one.

mod convert;
mod resources;

pub use convert::{rows_to_frame, RESPONSE_FRAME};
pub use resources::{ColumnInfo, Defaults, Resource, ResourceError, ResourceRequest};

use crate::auth::identity;
use crate::config::{AuthMethod, ConfigError, ConnectionSettings, DatasourceSettings};
use crate::engine::{Connector, ExecError, ResilientExecutor, StatementConnector, PING_STATEMENT};
use crate::models::{
    long_to_wide, DataQuery, DataResponse, FillMissing, Frame, FrameError, QueryContext,
    QueryDataRequest, QueryDataResponse,
};
use crate::query::{expand_macros, split_statements};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that prevent a datasource instance from being built.
#[derive(Debug, Error)]
pub enum DatasourceError {
    /// The settings are incomplete or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The warehouse could not be reached.
    #[error("failed to connect to warehouse: {0}")]
    Connect(#[from] ExecError),
}

/// Errors of a single dashboard query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query payload (time range, interval or panel model) is malformed.
    #[error("invalid query: {0}")]
    Template(String),

    /// Nothing executable remains after macro expansion.
    #[error("query is empty")]
    EmptyQuery,

    /// A statement failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The result could not be shaped into a frame.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Outcome of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The warehouse answered the ping.
    Ok,
    /// The ping failed.
    Error,
}

/// Health check reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    /// Up or down.
    pub status: HealthStatus,
    /// Human readable detail, including the error text on failure.
    pub message: String,
}

/// A configured datasource instance.
#[derive(Debug)]
pub struct Datasource {
    executor: ResilientExecutor,
    disposed: AtomicBool,
}

impl Datasource {
    /// Builds an instance from settings and checks the connection.
    ///
    /// With pass-through authentication the check is skipped when no caller
    /// token is available yet; the first query performs it instead.
    ///
    /// # Errors
    ///
    /// Returns [`DatasourceError::Config`] for invalid settings and
    /// [`DatasourceError::Connect`] if the warehouse cannot be reached. No
    /// partial instance is returned.
    pub async fn new(settings: &DatasourceSettings) -> Result<Self, DatasourceError> {
        settings.validate_settings()?;
        let connector = StatementConnector::from_settings(settings)?;
        tracing::info!(
            hostname = %settings.hostname,
            warehouse_id = %settings.warehouse_id()?,
            auth_method = %settings.auth_method,
            "Creating datasource"
        );

        let ping = settings.auth_method != AuthMethod::OAuth2PassThrough
            || identity::current().is_some();
        if !ping {
            tracing::debug!("Deferring connection check until a caller token is available");
        }
        Self::build(Arc::new(connector), settings.connection, ping).await
    }

    /// Builds an instance on top of any connector and checks the connection.
    ///
    /// # Errors
    ///
    /// Returns [`DatasourceError::Connect`] if no connection can be made or
    /// the ping fails.
    pub async fn with_connector(
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
    ) -> Result<Self, DatasourceError> {
        Self::build(connector, settings, true).await
    }

    async fn build(
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
        ping: bool,
    ) -> Result<Self, DatasourceError> {
        let executor = ResilientExecutor::connect(connector, settings).await?;
        if ping {
            if let Err(e) = executor.ping(&CancellationToken::new()).await {
                tracing::error!(error = %e, "Could not ping warehouse");
                executor.close().await;
                return Err(e.into());
            }
        }
        tracing::info!("Datasource ready");
        Ok(Self {
            executor,
            disposed: AtomicBool::new(false),
        })
    }

    /// Runs every query of the batch concurrently.
    ///
    /// Each query gets its own entry keyed by `refId`; a failing query carries
    /// its error and never affects its siblings.
    pub async fn query_data(
        &self,
        request: QueryDataRequest,
        cancel: &CancellationToken,
    ) -> QueryDataResponse {
        let runs = request.queries.iter().map(|query| async move {
            let response = match self.query(query, cancel).await {
                Ok(frame) => DataResponse::with_frame(frame),
                Err(e) => {
                    tracing::warn!(ref_id = %query.ref_id, error = %e, "Query failed");
                    DataResponse::with_error(e)
                }
            };
            (query.ref_id.clone(), response)
        });

        QueryDataResponse {
            results: futures::future::join_all(runs).await.into_iter().collect(),
        }
    }

    /// Runs one dashboard query.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the query is malformed, the expanded SQL is
    /// empty, a statement fails or the result cannot be converted.
    pub async fn query(
        &self,
        query: &DataQuery,
        cancel: &CancellationToken,
    ) -> Result<Frame, QueryError> {
        let parsed = query
            .parse()
            .map_err(|e| QueryError::Template(e.to_string()))?;
        let ctx = QueryContext::new(
            parsed.time_range,
            parsed.interval(),
            parsed.model.raw_sql_query.as_str(),
        );

        let sql = expand_macros(&ctx.raw_template, &ctx);
        let statements = split_statements(&sql).ok_or(QueryError::EmptyQuery)?;
        tracing::debug!(
            ref_id = %query.ref_id,
            setup = statements.setup.len(),
            "Executing query"
        );

        for statement in &statements.setup {
            self.executor.exec(statement, cancel).await?;
        }
        let rows = self.executor.query(statements.query, cancel).await?;
        let frame = rows_to_frame(&rows)?;

        let settings = parsed.model.query_settings;
        if !settings.convert_long_to_wide {
            return Ok(frame);
        }
        let fill = FillMissing {
            mode: settings.fill_mode,
            value: settings.fill_value,
        };
        match long_to_wide(&frame, fill) {
            Ok(wide) => Ok(wide),
            Err(e) => {
                tracing::warn!(ref_id = %query.ref_id, error = %e, "Long to wide conversion failed, returning long frame");
                Ok(frame)
            }
        }
    }

    /// Probes the warehouse with `SELECT 1`.
    pub async fn check_health(&self, cancel: &CancellationToken) -> HealthCheckResult {
        match self.executor.query(PING_STATEMENT, cancel).await {
            Ok(_) => HealthCheckResult {
                status: HealthStatus::Ok,
                message: "Data source is working".to_string(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Health check failed");
                HealthCheckResult {
                    status: HealthStatus::Error,
                    message: format!("SQL Connection Failed: {e}"),
                }
            }
        }
    }

    /// Serves a catalog introspection resource.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] for unknown paths, malformed bodies, unsafe
    /// identifiers or failed statements.
    pub async fn call_resource(
        &self,
        path: &str,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ResourceError> {
        let resource: Resource = path.parse()?;
        let request = ResourceRequest::from_body(body)?;
        let statement = resource.statement(&request)?;
        tracing::debug!(path, statement = %statement, "Serving resource");

        let rows = self.executor.query(&statement, cancel).await?;
        resource.shape(&rows)
    }

    /// Releases the pooled connection.
    ///
    /// Only the first call closes the connection; later calls do nothing.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.executor.close().await;
        tracing::info!("Datasource disposed");
    }
}
