//! Connection over the warehouse statement execution REST API.
//!
//! A statement is submitted with a short server-side wait, polled until it
//! reaches a terminal state, and its inline result is paged in through
//! `next_chunk_internal_link`.

use super::{Connection, Connector, ExecError};
use crate::auth::Credential;
use crate::config::{ConfigError, ConnectionSettings, DatasourceSettings};
use crate::models::{ColumnMeta, RowSet};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";
const WAIT_TIMEOUT: &str = "10s";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates [`StatementConnection`]s for one warehouse.
#[derive(Debug, Clone)]
pub struct StatementConnector {
    base_url: String,
    warehouse_id: String,
    credential: Arc<Credential>,
}

impl StatementConnector {
    /// Creates a connector for the warehouse at `base_url`.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        warehouse_id: impl Into<String>,
        credential: Arc<Credential>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            warehouse_id: warehouse_id.into(),
            credential,
        }
    }

    /// Creates a connector from datasource settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHttpPath`] if the HTTP path does not name
    /// a warehouse.
    pub fn from_settings(settings: &DatasourceSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(
            settings.base_url(),
            settings.warehouse_id()?,
            Arc::new(settings.credential()),
        ))
    }
}

#[async_trait]
impl Connector for StatementConnector {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn Connection>, ExecError> {
        let connection = StatementConnection::new(
            self.base_url.clone(),
            self.warehouse_id.clone(),
            Arc::clone(&self.credential),
            *settings,
        )?;
        tracing::debug!(warehouse_id = %self.warehouse_id, "Statement connection opened");
        Ok(Arc::new(connection))
    }
}

/// HTTP client and the time it was built.
struct HttpPool {
    client: reqwest::Client,
    created: Instant,
}

impl HttpPool {
    fn new(settings: &ConnectionSettings) -> Result<Self, ExecError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(settings.max_idle_conns)
            .pool_idle_timeout(settings.conn_max_idle_time)
            .build()
            .map_err(|e| ExecError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            created: Instant::now(),
        })
    }
}

/// A pooled connection to one warehouse.
pub struct StatementConnection {
    base_url: String,
    warehouse_id: String,
    credential: Arc<Credential>,
    settings: ConnectionSettings,
    pool: RwLock<HttpPool>,
    permits: Option<Arc<Semaphore>>,
    closed: AtomicBool,
}

impl StatementConnection {
    fn new(
        base_url: String,
        warehouse_id: String,
        credential: Arc<Credential>,
        settings: ConnectionSettings,
    ) -> Result<Self, ExecError> {
        Ok(Self {
            base_url,
            warehouse_id,
            credential,
            pool: RwLock::new(HttpPool::new(&settings)?),
            permits: (settings.max_open_conns > 0)
                .then(|| Arc::new(Semaphore::new(settings.max_open_conns))),
            settings,
            closed: AtomicBool::new(false),
        })
    }

    fn is_expired(&self, pool: &HttpPool) -> bool {
        self.settings
            .conn_max_lifetime
            .is_some_and(|lifetime| pool.created.elapsed() >= lifetime)
    }

    /// Returns the HTTP client, replacing it once it outlived its lifetime.
    fn client(&self) -> Result<reqwest::Client, ExecError> {
        {
            let pool = self.pool.read().unwrap_or_else(PoisonError::into_inner);
            if !self.is_expired(&pool) {
                return Ok(pool.client.clone());
            }
        }
        let mut pool = self.pool.write().unwrap_or_else(PoisonError::into_inner);
        if self.is_expired(&pool) {
            *pool = HttpPool::new(&self.settings)?;
            tracing::debug!("HTTP pool recycled after reaching its max lifetime");
        }
        Ok(pool.client.clone())
    }

    /// Sends one authenticated request, retrying throttled and unavailable
    /// responses with exponential backoff.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ExecError> {
        let client = self.client()?;
        let started = Instant::now();
        let mut retries = 0;

        loop {
            let mut builder = client.request(method.clone(), url);
            if let Some(body) = body {
                builder = builder.json(body);
            }
            let mut request = builder
                .build()
                .map_err(|e| ExecError::Transport(e.to_string()))?;
            self.credential.authenticate(&mut request).await?;

            let response = client
                .execute(request)
                .await
                .map_err(|e| ExecError::Transport(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let delay = self
                .settings
                .retry_backoff
                .saturating_mul(2_u32.saturating_pow(retries));
            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE;
            if retryable
                && retries < self.settings.retry_count
                && started
                    .elapsed()
                    .checked_add(delay)
                    .is_some_and(|total| total <= self.settings.max_retry_duration)
            {
                retries += 1;
                tracing::debug!(%status, retries, ?delay, "Retrying warehouse request");
                tokio::time::sleep(delay).await;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            return Err(http_error(status, &text));
        }
    }

    async fn send_json<T>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ExecError>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.send(method, url, body)
            .await?
            .json()
            .await
            .map_err(|e| ExecError::Decode(e.to_string()))
    }

    async fn submit(&self, sql: &str) -> Result<StatementResponse, ExecError> {
        let mut body = json!({
            "statement": sql,
            "warehouse_id": self.warehouse_id,
            "wait_timeout": WAIT_TIMEOUT,
            "on_wait_timeout": "CONTINUE",
            "disposition": "INLINE",
            "format": "JSON_ARRAY",
        });
        if self.settings.max_rows > 0 {
            body["row_limit"] = json!(self.settings.max_rows);
        }
        let url = format!("{}{STATEMENTS_PATH}", self.base_url);
        self.send_json(Method::POST, &url, Some(&body)).await
    }

    async fn poll(&self, statement_id: &str) -> Result<StatementResponse, ExecError> {
        tokio::time::sleep(POLL_INTERVAL).await;
        let url = format!("{}{STATEMENTS_PATH}/{statement_id}", self.base_url);
        self.send_json(Method::GET, &url, None).await
    }

    async fn cancel_statement(&self, statement_id: &str) {
        let url = format!("{}{STATEMENTS_PATH}/{statement_id}/cancel", self.base_url);
        match tokio::time::timeout(CANCEL_TIMEOUT, self.send(Method::POST, &url, None)).await {
            Ok(Ok(_)) => tracing::debug!(statement_id, "Statement cancelled"),
            Ok(Err(e)) => tracing::warn!(statement_id, error = %e, "Failed to cancel statement"),
            Err(_) => tracing::warn!(statement_id, "Timed out cancelling statement"),
        }
    }

    /// Runs `sql` to completion. Rows are collected only if `fetch_rows`.
    async fn execute(
        &self,
        sql: &str,
        cancel: &CancellationToken,
        fetch_rows: bool,
    ) -> Result<RowSet, ExecError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecError::Connect("connection is closed".to_string()));
        }
        // A timeout too large to schedule is no timeout.
        let deadline = self.settings.query_timeout.and_then(|limit| {
            tokio::time::Instant::now()
                .checked_add(limit)
                .map(|at| (at, limit))
        });

        let _permit = match &self.permits {
            Some(permits) => Some(
                guard(cancel, deadline, async {
                    Arc::clone(permits)
                        .acquire_owned()
                        .await
                        .map_err(|_| ExecError::Connect("connection is closed".to_string()))
                })
                .await?,
            ),
            None => None,
        };

        let mut response = guard(cancel, deadline, self.submit(sql)).await?;
        loop {
            match response.status.state {
                StatementState::Pending | StatementState::Running => {
                    let statement_id = response.statement_id.clone();
                    match guard(cancel, deadline, self.poll(&statement_id)).await {
                        Ok(next) => response = next,
                        Err(e @ (ExecError::Cancelled | ExecError::Timeout(_))) => {
                            self.cancel_statement(&statement_id).await;
                            return Err(e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                StatementState::Succeeded => break,
                StatementState::Failed | StatementState::Canceled | StatementState::Closed => {
                    return Err(response.status.into_error());
                }
            }
        }

        if !fetch_rows {
            return Ok(RowSet::default());
        }
        guard(cancel, deadline, self.collect(response)).await
    }

    async fn collect(&self, response: StatementResponse) -> Result<RowSet, ExecError> {
        let columns = response
            .manifest
            .map(|manifest| manifest.schema.columns)
            .unwrap_or_default()
            .into_iter()
            .map(ColumnInfo::into_meta)
            .collect();
        let mut rows = RowSet::new(columns);

        let mut chunk = response.result.unwrap_or_default();
        loop {
            rows.rows.append(&mut chunk.data_array);
            let Some(link) = chunk.next_chunk_internal_link.take() else {
                break;
            };
            let url = format!("{}{link}", self.base_url);
            chunk = self.send_json(Method::GET, &url, None).await?;
        }
        Ok(rows)
    }
}

/// Runs `work` unless the caller cancels or the deadline passes first.
async fn guard<T, F>(
    cancel: &CancellationToken,
    deadline: Option<(tokio::time::Instant, Duration)>,
    work: F,
) -> Result<T, ExecError>
where
    F: Future<Output = Result<T, ExecError>>,
{
    let expiry = async {
        match deadline {
            Some((at, limit)) => {
                tokio::time::sleep_until(at).await;
                limit
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        () = cancel.cancelled() => Err(ExecError::Cancelled),
        limit = expiry => Err(ExecError::Timeout(limit)),
        result = work => result,
    }
}

fn http_error(status: StatusCode, body: &str) -> ExecError {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        error_code: Option<String>,
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(error) => ExecError::Engine {
            code: error.error_code,
            message: error.message,
        },
        Err(_) => ExecError::Http {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                body.to_string()
            },
        },
    }
}

#[async_trait]
impl Connection for StatementConnection {
    async fn query(&self, sql: &str, cancel: &CancellationToken) -> Result<RowSet, ExecError> {
        self.execute(sql, cancel, true).await
    }

    async fn exec(&self, sql: &str, cancel: &CancellationToken) -> Result<(), ExecError> {
        self.execute(sql, cancel, false).await.map(|_| ())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(permits) = &self.permits {
            permits.close();
        }
        tracing::debug!(warehouse_id = %self.warehouse_id, "Statement connection closed");
    }
}

impl std::fmt::Debug for StatementConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementConnection")
            .field("base_url", &self.base_url)
            .field("warehouse_id", &self.warehouse_id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: StatementState,
    #[serde(default)]
    error: Option<ServiceError>,
}

impl StatementStatus {
    fn into_error(self) -> ExecError {
        let state = self.state;
        let error = self.error.unwrap_or_default();
        ExecError::Engine {
            code: error.error_code,
            message: error
                .message
                .unwrap_or_else(|| format!("statement ended in state {state:?}")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServiceError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    schema: Schema,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
    #[serde(default)]
    type_text: Option<String>,
    #[serde(default)]
    type_name: Option<String>,
}

impl ColumnInfo {
    fn into_meta(self) -> ColumnMeta {
        let type_name = self.type_text.or(self.type_name).unwrap_or_default();
        ColumnMeta::new(self.name, type_name)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResultChunk {
    #[serde(default)]
    data_array: Vec<Vec<Option<String>>>,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
}
