//! `MockConnector` — an in-process test double for the backend traits.
//!
//! Records every statement it receives and answers from a queue of scripted
//! responses, so pool, executor and record behaviour can be tested without a
//! database server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use schema::{Row, Value};

use crate::{Connection, Connector, DriverError, ParamStyle};

/// Scripted answer for the next statement.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Rows(Vec<Row>),
    Affected(u64),
    Error(String),
    /// Lose the connection: this and every later call on it fail.
    Disconnect(String),
}

/// A statement as the backend received it (placeholders already rewritten).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    statements: Vec<Statement>,
    responses: VecDeque<MockResponse>,
    connect_error: Option<String>,
    /// Connects beyond this many fail with `connect_error`.
    connect_limit: Option<usize>,
    latency: Option<Duration>,
    opened: usize,
    closed: usize,
    discarded: usize,
}

/// Cloneable handle; clones share the same script and recordings.
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    style: ParamStyle,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            style: ParamStyle::Question,
        }
    }

    pub fn with_param_style(mut self, style: ParamStyle) -> Self {
        self.style = style;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer the next row-returning statement with `rows`.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state().responses.push_back(MockResponse::Rows(rows));
    }

    /// Answer the next mutating statement with an affected-row count.
    pub fn push_affected(&self, affected: u64) {
        self.state().responses.push_back(MockResponse::Affected(affected));
    }

    /// Fail the next statement with a driver error.
    pub fn push_error(&self, message: impl Into<String>) {
        self.state().responses.push_back(MockResponse::Error(message.into()));
    }

    /// Make every subsequent `connect` fail.
    pub fn fail_connect(&self, message: impl Into<String>) {
        self.state().connect_error = Some(message.into());
    }

    /// Let `opened` connections succeed, then fail every later `connect`.
    pub fn fail_connect_after(&self, opened: usize, message: impl Into<String>) {
        let mut state = self.state();
        state.connect_limit = Some(opened);
        state.connect_error = Some(message.into());
    }

    /// Drop the server side of whichever connection runs the next statement.
    pub fn push_disconnect(&self, message: impl Into<String>) {
        self.state().responses.push_back(MockResponse::Disconnect(message.into()));
    }

    /// Delay every statement, to hold connections busy.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.state().statements.clone()
    }

    pub fn last_statement(&self) -> Option<Statement> {
        self.state().statements.last().cloned()
    }

    /// Connections opened so far.
    pub fn opened(&self) -> usize {
        self.state().opened
    }

    /// Connections closed gracefully.
    pub fn closed(&self) -> usize {
        self.state().closed
    }

    /// Connections dropped without being closed.
    pub fn discarded(&self) -> usize {
        self.state().discarded
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

#[async_trait]
impl Connector for MockConnector {
    fn param_style(&self) -> ParamStyle {
        self.style
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, DriverError> {
        let mut state = self.state();
        let refused = state.connect_limit.map_or(true, |limit| state.opened >= limit);
        if let Some(message) = state.connect_error.as_ref().filter(|_| refused) {
            return Err(DriverError::Other(message.clone()));
        }
        state.opened += 1;
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            closed: false,
            dead: false,
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    closed: bool,
    dead: bool,
}

impl MockConnection {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn respond(
        &mut self,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<MockResponse>, DriverError> {
        if self.dead {
            return Err(DriverError::Disconnected("connection closed".into()));
        }
        match self.next_response(sql, args).await {
            Some(MockResponse::Disconnect(message)) => {
                self.dead = true;
                Err(DriverError::Disconnected(message))
            }
            response => Ok(response),
        }
    }

    async fn next_response(&self, sql: &str, args: &[Value]) -> Option<MockResponse> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state();
        state.statements.push(Statement {
            sql: sql.to_owned(),
            args: args.to_vec(),
        });
        state.responses.pop_front()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn fetch(
        &mut self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DriverError> {
        match self.respond(sql, args).await? {
            Some(MockResponse::Rows(mut rows)) => {
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                Ok(rows)
            }
            Some(MockResponse::Error(message)) => Err(DriverError::Other(message)),
            Some(MockResponse::Affected(_) | MockResponse::Disconnect(_)) | None => {
                Ok(Vec::new())
            }
        }
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, DriverError> {
        match self.respond(sql, args).await? {
            Some(MockResponse::Affected(affected)) => Ok(affected),
            Some(MockResponse::Error(message)) => Err(DriverError::Other(message)),
            Some(MockResponse::Rows(_) | MockResponse::Disconnect(_)) => Ok(0),
            None => Ok(1),
        }
    }

    async fn close(mut self: Box<Self>) -> Result<(), DriverError> {
        self.closed = true;
        self.state().closed += 1;
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.state().discarded += 1;
        }
    }
}
