//! Scripted in-process connector for tests.

use super::{Connection, Connector, ExecError};
use crate::config::ConnectionSettings;
use crate::models::RowSet;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A statement seen by a scripted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Query(String),
    Exec(String),
}

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<RowSet, ExecError>>,
    connect_errors: VecDeque<ExecError>,
    calls: Vec<Call>,
    connects: usize,
    closes: usize,
    connect_delay: Option<Duration>,
    cancel_on_call: Option<CancellationToken>,
}

/// Replays queued responses in order; an empty queue answers with an empty
/// row set.
#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, rows: RowSet) -> &Self {
        self.script.lock().unwrap().responses.push_back(Ok(rows));
        self
    }

    pub(crate) fn fail(&self, error: ExecError) -> &Self {
        self.script.lock().unwrap().responses.push_back(Err(error));
        self
    }

    pub(crate) fn fail_connect(&self, error: ExecError) -> &Self {
        self.script.lock().unwrap().connect_errors.push_back(error);
        self
    }

    /// Makes every later `connect` take `delay`.
    pub(crate) fn delay_connect(&self, delay: Duration) -> &Self {
        self.script.lock().unwrap().connect_delay = Some(delay);
        self
    }

    /// Cancels `token` as soon as the next statement has been answered.
    pub(crate) fn cancel_on_call(&self, token: CancellationToken) -> &Self {
        self.script.lock().unwrap().cancel_on_call = Some(token);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub(crate) fn connects(&self) -> usize {
        self.script.lock().unwrap().connects
    }

    pub(crate) fn closes(&self) -> usize {
        self.script.lock().unwrap().closes
    }

    fn next(&self, call: Call) -> Result<RowSet, ExecError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(call);
        if let Some(token) = script.cancel_on_call.take() {
            token.cancel();
        }
        script.responses.pop_front().unwrap_or_else(|| Ok(RowSet::default()))
    }
}

pub(crate) fn session_expired() -> ExecError {
    ExecError::Engine {
        code: None,
        message: "Invalid SessionHandle: 01ef".to_string(),
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _settings: &ConnectionSettings,
    ) -> Result<Arc<dyn Connection>, ExecError> {
        let delay = self.script.lock().unwrap().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script.lock().unwrap();
        if let Some(error) = script.connect_errors.pop_front() {
            return Err(error);
        }
        script.connects += 1;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Connection for ScriptedConnector {
    async fn query(&self, sql: &str, cancel: &CancellationToken) -> Result<RowSet, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        self.next(Call::Query(sql.to_string()))
    }

    async fn exec(&self, sql: &str, cancel: &CancellationToken) -> Result<(), ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        self.next(Call::Exec(sql.to_string())).map(|_| ())
    }

    async fn close(&self) {
        self.script.lock().unwrap().closes += 1;
    }
}
