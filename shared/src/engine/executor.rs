//! Session-expiry recovery around a pooled connection.

use super::{Connection, Connector, ExecError};
use crate::config::ConnectionSettings;
use crate::models::RowSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Statement used to ping a connection.
pub const PING_STATEMENT: &str = "SELECT 1";

struct PooledHandle {
    connection: Arc<dyn Connection>,
    /// Bumped on every rebuild so concurrent callers rebuild only once.
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Query,
    Exec,
}

enum Outcome {
    Rows(RowSet),
    Done,
}

/// Executes statements on the current pooled connection and replaces it once
/// when the engine reports an expired session.
///
/// A failing call is retried exactly once after the rebuild; any other error,
/// or a failure of the retry, is returned unchanged.
pub struct ResilientExecutor {
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    handle: RwLock<PooledHandle>,
}

impl ResilientExecutor {
    /// Opens the first connection.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if no connection can be created.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
    ) -> Result<Self, ExecError> {
        let connection = connector.connect(&settings).await?;
        Ok(Self {
            connector,
            settings,
            handle: RwLock::new(PooledHandle {
                connection,
                generation: 0,
            }),
        })
    }

    /// Runs a row-returning statement.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the statement fails, or fails again after
    /// a session rebuild.
    pub async fn query(&self, sql: &str, cancel: &CancellationToken) -> Result<RowSet, ExecError> {
        match self.run(Op::Query, sql, cancel).await? {
            Outcome::Rows(rows) => Ok(rows),
            Outcome::Done => Ok(RowSet::default()),
        }
    }

    /// Runs a statement without rows.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the statement fails, or fails again after
    /// a session rebuild.
    pub async fn exec(&self, sql: &str, cancel: &CancellationToken) -> Result<(), ExecError> {
        self.run(Op::Exec, sql, cancel).await.map(|_| ())
    }

    /// Probes the connection with `SELECT 1`.
    ///
    /// # Errors
    ///
    /// Returns the ping's error.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), ExecError> {
        self.query(PING_STATEMENT, cancel).await.map(|_| ())
    }

    /// Releases the current connection.
    pub async fn close(&self) {
        let handle = self.handle.read().await;
        handle.connection.close().await;
    }

    async fn run(
        &self,
        op: Op,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let (connection, generation) = self.current().await;
        let error = match attempt(connection.as_ref(), op, sql, cancel).await {
            Err(e) if e.is_session_expired() => e,
            other => return other,
        };

        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        tracing::warn!(error = %error, ?op, "Session expired, rebuilding connection");

        let connection = tokio::select! {
            () = cancel.cancelled() => return Err(ExecError::Cancelled),
            rebuilt = self.rebuild(generation) => rebuilt?,
        };
        attempt(connection.as_ref(), op, sql, cancel).await
    }

    async fn current(&self) -> (Arc<dyn Connection>, u64) {
        let handle = self.handle.read().await;
        (Arc::clone(&handle.connection), handle.generation)
    }

    /// Replaces the connection unless another caller already replaced the one
    /// seen at `seen_generation`.
    async fn rebuild(&self, seen_generation: u64) -> Result<Arc<dyn Connection>, ExecError> {
        let mut handle = self.handle.write().await;
        if handle.generation == seen_generation {
            handle.connection = self.connector.connect(&self.settings).await?;
            handle.generation += 1;
            tracing::info!(generation = handle.generation, "Connection rebuilt");
        }
        Ok(Arc::clone(&handle.connection))
    }
}

async fn attempt(
    connection: &dyn Connection,
    op: Op,
    sql: &str,
    cancel: &CancellationToken,
) -> Result<Outcome, ExecError> {
    match op {
        Op::Query => connection.query(sql, cancel).await.map(Outcome::Rows),
        Op::Exec => connection.exec(sql, cancel).await.map(|()| Outcome::Done),
    }
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
