//! The driver seam.
//!
//! A concrete database driver implements these traits; the session layer
//! only ever talks to them through trait objects. [`Database`] is the pooled
//! connection handle, [`DriverTransaction`] an open transaction, and
//! [`RowSource`] a result set being read.
//!
//! A session bound to either one resolves to a `&dyn Querier` or
//! `&dyn Executor`, so query code never branches on transaction state.
//!
//! Errors are boxed and passed to the caller unchanged as
//! [`Error::Driver`](crate::Error::Driver).

use async_trait::async_trait;
use sqlsession_types::SqlValue;

use crate::context::Context;
use crate::error::BoxError;
use crate::row::Column;
use crate::transaction::TxOptions;

/// Result type for driver calls.
pub type DriverResult<T> = std::result::Result<T, BoxError>;

/// Outcome of a statement that returns no rows.
///
/// Drivers that cannot report a field leave it `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Id generated by the statement.
    pub last_insert_id: Option<i64>,
    /// Rows changed by the statement.
    pub rows_affected: Option<u64>,
}

impl ExecOutcome {
    /// An outcome reporting both fields.
    #[must_use]
    pub fn new(last_insert_id: i64, rows_affected: u64) -> Self {
        Self {
            last_insert_id: Some(last_insert_id),
            rows_affected: Some(rows_affected),
        }
    }
}

/// Runs statements that return rows.
#[async_trait]
pub trait Querier: Send + Sync {
    /// Start a query and return its result set.
    async fn query(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[SqlValue],
    ) -> DriverResult<Box<dyn RowSource>>;
}

/// Runs statements that return no rows.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a statement.
    async fn exec(&self, ctx: &Context, sql: &str, params: &[SqlValue])
    -> DriverResult<ExecOutcome>;
}

/// A pooled database handle.
#[async_trait]
pub trait Database: Querier + Executor {
    /// Open a real transaction.
    async fn begin(&self, ctx: &Context, opts: &TxOptions)
    -> DriverResult<Box<dyn DriverTransaction>>;

    /// Check the database is reachable.
    async fn ping(&self, ctx: &Context) -> DriverResult<()>;

    /// Close every connection.
    async fn close(&self) -> DriverResult<()>;

    /// Connections currently open, when the driver tracks it.
    fn open_connections(&self) -> Option<usize> {
        None
    }
}

/// An open transaction.
///
/// Dropping it without commit or rollback must roll it back.
#[async_trait]
pub trait DriverTransaction: Querier + Executor {
    /// Commit the transaction.
    async fn commit(&self) -> DriverResult<()>;

    /// Roll the transaction back.
    async fn rollback(&self) -> DriverResult<()>;
}

/// A result set being read row by row.
#[async_trait]
pub trait RowSource: Send {
    /// Column descriptions, in row order.
    fn columns(&self) -> &[Column];

    /// Replace the contents of `row` with the next row.
    ///
    /// Returns `false` once the result set is exhausted.
    async fn next_row(&mut self, row: &mut Vec<SqlValue>) -> DriverResult<bool>;

    /// Release the result set.
    async fn close(&mut self) -> DriverResult<()>;
}
