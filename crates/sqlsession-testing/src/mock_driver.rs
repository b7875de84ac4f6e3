//! Scripted in-memory driver for unit and integration tests.
//!
//! [`MockDatabase`] implements the sqlsession driver traits. Tests queue
//! expectations in the order calls should arrive; each call consumes the
//! next expectation and answers with its scripted response. A call that does
//! not match fails with [`MockError::Unexpected`] and is remembered, so
//! [`MockDatabase::verify`] reports it even if the session layer swallowed
//! the error.
//!
//! ## Example
//!
//! ```rust
//! use sqlsession::ExecOutcome;
//! use sqlsession_testing::mock_driver::{MockDatabase, MockRows};
//! use sqlsession_types::{SqlValue, ValueKind};
//!
//! let mock = MockDatabase::new();
//! mock.expect_begin();
//! mock.expect_exec("INSERT INTO users (name) VALUES (?)")
//!     .returning_outcome(ExecOutcome::new(1, 1));
//! mock.expect_query("SELECT id FROM users")
//!     .returning(MockRows::new([("id", ValueKind::Int64)]).row([SqlValue::Int(1)]));
//! mock.expect_commit();
//! assert_eq!(mock.pending(), 4);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlsession::driver::{
    Database, DriverResult, DriverTransaction, ExecOutcome, Executor, Querier, RowSource,
};
use sqlsession::{Column, Context, TxOptions};
use sqlsession_types::{SqlValue, ValueKind};
use thiserror::Error;

/// Error type for mock driver operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    /// A call arrived that the script did not expect next.
    #[error("unexpected call: expected {expected}, got {actual}")]
    Unexpected {
        /// The next expectation, or "nothing".
        expected: String,
        /// The call that arrived.
        actual: String,
    },

    /// Expectations left over when verifying.
    #[error("unmet expectations: {0:?}")]
    Unmet(Vec<String>),

    /// An error the script asked the driver to return.
    #[error("{0}")]
    Scripted(String),
}

/// A call the driver can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    /// A transaction was opened.
    Begin,
    /// A query ran.
    Query {
        /// SQL text.
        sql: String,
        /// Parameters.
        params: Vec<SqlValue>,
        /// Whether it ran inside a transaction.
        in_tx: bool,
    },
    /// A statement ran.
    Exec {
        /// SQL text.
        sql: String,
        /// Parameters.
        params: Vec<SqlValue>,
        /// Whether it ran inside a transaction.
        in_tx: bool,
    },
    /// A transaction was committed.
    Commit,
    /// A transaction was rolled back.
    Rollback,
    /// A result set was closed by the caller.
    RowsClosed,
    /// The database was pinged.
    Ping,
    /// The database was closed.
    Close,
}

#[derive(Debug, Clone, PartialEq)]
enum ExpectedCall {
    Begin,
    Query(String),
    Exec(String),
    Commit,
    Rollback,
}

impl fmt::Display for ExpectedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => f.write_str("begin"),
            Self::Query(sql) => write!(f, "query {sql:?}"),
            Self::Exec(sql) => write!(f, "exec {sql:?}"),
            Self::Commit => f.write_str("commit"),
            Self::Rollback => f.write_str("rollback"),
        }
    }
}

#[derive(Debug, Clone)]
struct Expectation {
    call: ExpectedCall,
    args: Option<Vec<SqlValue>>,
    rows: Option<MockRows>,
    outcome: ExecOutcome,
    error: Option<String>,
    delay: Option<Duration>,
}

impl Expectation {
    fn new(call: ExpectedCall) -> Self {
        Self {
            call,
            args: None,
            rows: None,
            outcome: ExecOutcome::default(),
            error: None,
            delay: None,
        }
    }
}

/// A canned result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockRows {
    columns: Vec<Column>,
    rows: VecDeque<Vec<SqlValue>>,
    row_error: Option<(usize, String)>,
}

impl MockRows {
    /// A result set with the given columns and no rows.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ValueKind)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, kind)| Column::new(name, kind))
                .collect(),
            rows: VecDeque::new(),
            row_error: None,
        }
    }

    /// A result set over prepared column descriptions.
    #[must_use]
    pub fn with_columns(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: VecDeque::new(),
            row_error: None,
        }
    }

    /// Append a row.
    #[must_use]
    pub fn row(mut self, values: impl IntoIterator<Item = SqlValue>) -> Self {
        self.rows.push_back(values.into_iter().collect());
        self
    }

    /// Fail when reading row `index` (0-based) instead of returning it.
    #[must_use]
    pub fn error_at(mut self, index: usize, message: impl Into<String>) -> Self {
        self.row_error = Some((index, message.into()));
        self
    }

    /// Column descriptions.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Rows left.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows are left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Default)]
struct Inner {
    expectations: Mutex<VecDeque<Expectation>>,
    events: Mutex<Vec<MockEvent>>,
    failures: Mutex<Vec<MockError>>,
    open_connections: Mutex<Option<usize>>,
}

impl Inner {
    /// Pop the next expectation if it matches `call`.
    fn take(&self, call: ExpectedCall, params: &[SqlValue]) -> Result<Expectation, MockError> {
        let mut queue = self.expectations.lock();
        let matches = queue.front().is_some_and(|next| {
            next.call == call && next.args.as_deref().is_none_or(|args| args == params)
        });
        if matches {
            if let Some(expectation) = queue.pop_front() {
                return Ok(expectation);
            }
        }

        let expected = queue
            .front()
            .map_or_else(|| "nothing".to_string(), |next| next.call.to_string());
        drop(queue);
        let err = MockError::Unexpected {
            expected,
            actual: format!("{call} with {params:?}"),
        };
        tracing::debug!(error = %err, "mock driver rejected call");
        self.failures.lock().push(err.clone());
        Err(err)
    }

    fn record(&self, event: MockEvent) {
        self.events.lock().push(event);
    }

    async fn answer(&self, call: ExpectedCall, params: &[SqlValue]) -> DriverResult<Expectation> {
        let expectation = self.take(call, params)?;
        if let Some(delay) = expectation.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &expectation.error {
            return Err(Box::new(MockError::Scripted(message.clone())));
        }
        Ok(expectation)
    }

    async fn query(
        self: &Arc<Self>,
        sql: &str,
        params: &[SqlValue],
        in_tx: bool,
    ) -> DriverResult<Box<dyn RowSource>> {
        self.record(MockEvent::Query {
            sql: sql.to_string(),
            params: params.to_vec(),
            in_tx,
        });
        let expectation = self.answer(ExpectedCall::Query(sql.to_string()), params).await?;
        Ok(Box::new(MockRowSource {
            rows: expectation.rows.unwrap_or_default(),
            read: 0,
            inner: Arc::clone(self),
        }))
    }

    async fn exec(&self, sql: &str, params: &[SqlValue], in_tx: bool) -> DriverResult<ExecOutcome> {
        self.record(MockEvent::Exec {
            sql: sql.to_string(),
            params: params.to_vec(),
            in_tx,
        });
        let expectation = self.answer(ExpectedCall::Exec(sql.to_string()), params).await?;
        Ok(expectation.outcome)
    }
}

/// Handle for refining the expectation just queued.
pub struct ExpectationBuilder {
    inner: Arc<Inner>,
    index: usize,
}

impl ExpectationBuilder {
    fn update(self, f: impl FnOnce(&mut Expectation)) -> Self {
        if let Some(expectation) = self.inner.expectations.lock().get_mut(self.index) {
            f(expectation);
        }
        self
    }

    /// Only match when called with exactly these parameters.
    pub fn with_args(self, args: impl IntoIterator<Item = SqlValue>) -> Self {
        let args: Vec<_> = args.into_iter().collect();
        self.update(|e| e.args = Some(args))
    }

    /// Answer a query with these rows.
    pub fn returning(self, rows: MockRows) -> Self {
        self.update(|e| e.rows = Some(rows))
    }

    /// Answer an exec with this outcome.
    pub fn returning_outcome(self, outcome: ExecOutcome) -> Self {
        self.update(|e| e.outcome = outcome)
    }

    /// Fail the call with a [`MockError::Scripted`] error.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.update(|e| e.error = Some(message))
    }

    /// Wait this long before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.update(|e| e.delay = Some(delay))
    }
}

/// A scripted database driver.
///
/// Cheap to clone; clones share the script and the event log.
#[derive(Clone, Default)]
pub struct MockDatabase {
    inner: Arc<Inner>,
}

impl MockDatabase {
    /// A driver with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This driver as a shareable trait object, ready for `Db::new`.
    #[must_use]
    pub fn handle(&self) -> Arc<dyn Database> {
        Arc::new(self.clone())
    }

    fn expect(&self, call: ExpectedCall) -> ExpectationBuilder {
        let mut queue = self.inner.expectations.lock();
        queue.push_back(Expectation::new(call));
        ExpectationBuilder {
            inner: Arc::clone(&self.inner),
            index: queue.len() - 1,
        }
    }

    /// Expect a transaction to be opened.
    pub fn expect_begin(&self) -> ExpectationBuilder {
        self.expect(ExpectedCall::Begin)
    }

    /// Expect a query with exactly this SQL text.
    pub fn expect_query(&self, sql: impl Into<String>) -> ExpectationBuilder {
        self.expect(ExpectedCall::Query(sql.into()))
    }

    /// Expect a statement with exactly this SQL text.
    pub fn expect_exec(&self, sql: impl Into<String>) -> ExpectationBuilder {
        self.expect(ExpectedCall::Exec(sql.into()))
    }

    /// Expect a commit.
    pub fn expect_commit(&self) -> ExpectationBuilder {
        self.expect(ExpectedCall::Commit)
    }

    /// Expect a rollback.
    pub fn expect_rollback(&self) -> ExpectationBuilder {
        self.expect(ExpectedCall::Rollback)
    }

    /// Report this many open connections, or nothing.
    pub fn set_open_connections(&self, open: Option<usize>) {
        *self.inner.open_connections.lock() = open;
    }

    /// Every call received, in order.
    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.inner.events.lock().clone()
    }

    /// Number of calls of one kind received.
    #[must_use]
    pub fn count(&self, matches: impl Fn(&MockEvent) -> bool) -> usize {
        self.inner.events.lock().iter().filter(|e| matches(e)).count()
    }

    /// Expectations not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.expectations.lock().len()
    }

    /// Check every expectation was consumed and no call was rejected.
    pub fn verify(&self) -> Result<(), MockError> {
        if let Some(failure) = self.inner.failures.lock().first() {
            return Err(failure.clone());
        }
        let unmet: Vec<String> = self
            .inner
            .expectations
            .lock()
            .iter()
            .map(|e| e.call.to_string())
            .collect();
        if unmet.is_empty() {
            Ok(())
        } else {
            Err(MockError::Unmet(unmet))
        }
    }
}

impl fmt::Debug for MockDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDatabase")
            .field("pending", &self.pending())
            .field("events", &self.inner.events.lock().len())
            .finish()
    }
}

#[async_trait]
impl Querier for MockDatabase {
    async fn query(
        &self,
        _ctx: &Context,
        sql: &str,
        params: &[SqlValue],
    ) -> DriverResult<Box<dyn RowSource>> {
        self.inner.query(sql, params, false).await
    }
}

#[async_trait]
impl Executor for MockDatabase {
    async fn exec(&self, _ctx: &Context, sql: &str, params: &[SqlValue]) -> DriverResult<ExecOutcome> {
        self.inner.exec(sql, params, false).await
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn begin(&self, _ctx: &Context, _opts: &TxOptions) -> DriverResult<Box<dyn DriverTransaction>> {
        self.inner.record(MockEvent::Begin);
        self.inner.answer(ExpectedCall::Begin, &[]).await?;
        Ok(Box::new(MockTransaction {
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn ping(&self, _ctx: &Context) -> DriverResult<()> {
        self.inner.record(MockEvent::Ping);
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.inner.record(MockEvent::Close);
        Ok(())
    }

    fn open_connections(&self) -> Option<usize> {
        *self.inner.open_connections.lock()
    }
}

/// A transaction opened on a [`MockDatabase`].
struct MockTransaction {
    inner: Arc<Inner>,
}

#[async_trait]
impl Querier for MockTransaction {
    async fn query(
        &self,
        _ctx: &Context,
        sql: &str,
        params: &[SqlValue],
    ) -> DriverResult<Box<dyn RowSource>> {
        self.inner.query(sql, params, true).await
    }
}

#[async_trait]
impl Executor for MockTransaction {
    async fn exec(&self, _ctx: &Context, sql: &str, params: &[SqlValue]) -> DriverResult<ExecOutcome> {
        self.inner.exec(sql, params, true).await
    }
}

#[async_trait]
impl DriverTransaction for MockTransaction {
    async fn commit(&self) -> DriverResult<()> {
        self.inner.record(MockEvent::Commit);
        self.inner.answer(ExpectedCall::Commit, &[]).await?;
        Ok(())
    }

    async fn rollback(&self) -> DriverResult<()> {
        self.inner.record(MockEvent::Rollback);
        self.inner.answer(ExpectedCall::Rollback, &[]).await?;
        Ok(())
    }
}

struct MockRowSource {
    rows: MockRows,
    read: usize,
    inner: Arc<Inner>,
}

#[async_trait]
impl RowSource for MockRowSource {
    fn columns(&self) -> &[Column] {
        &self.rows.columns
    }

    async fn next_row(&mut self, row: &mut Vec<SqlValue>) -> DriverResult<bool> {
        if let Some((index, message)) = &self.rows.row_error {
            if *index == self.read {
                return Err(Box::new(MockError::Scripted(message.clone())));
            }
        }
        match self.rows.rows.pop_front() {
            Some(values) => {
                self.read += 1;
                row.clear();
                row.extend(values);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.inner.record(MockEvent::RowsClosed);
        Ok(())
    }
}
