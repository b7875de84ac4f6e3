//! Sessions bound to the pool or to a transaction.
//!
//! A root [`Session`] comes from [`Db::session`](crate::Db::session) and runs
//! statements on the pooled handle. [`Session::begin`] returns a child
//! session bound to a transaction; calling `begin` on that child joins the
//! same transaction one level deeper. Every session of one tree borrows scan
//! slots from the root's arena, which is released when the root closes.
//!
//! ```text
//! root (pool, owns arena)
//!  └── begin ─> tx session (depth 1) ── begin ─> tx session (depth 2)
//! ```

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use sqlsession_pool::{Poolable, Recycle, Slot, ValueArena};
use sqlsession_types::{SqlValue, ToSql, to_params};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::context::Context;
use crate::cursor::Cursor;
use crate::db::Shared;
use crate::driver::{Database, Executor, Querier};
use crate::error::{Error, RecoveredPanic, Resource, Result};
use crate::from_row::FromRow;
use crate::hooks::{SelectTarget, Statement};
use crate::instrumentation;
use crate::metrics::Op;
use crate::row::Column;
use crate::transaction::{Exit, TxCore, TxOptions};

/// Outcome of [`Session::exec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Id generated by the statement, 0 when the driver reports none.
    pub last_insert_id: i64,
    /// Rows changed, 0 when the driver reports none.
    pub rows_affected: u64,
}

/// What a session runs its statements on.
#[derive(Clone)]
enum Target {
    Pool(Arc<dyn Database>),
    Tx(Arc<TxCore>),
}

/// A session's binding: its target plus the arena of its tree.
#[derive(Clone)]
pub(crate) struct Bound {
    target: Target,
    arena: Weak<Mutex<ValueArena>>,
}

impl Bound {
    fn querier(&self) -> Result<&dyn Querier> {
        match &self.target {
            Target::Pool(db) => {
                let querier: &dyn Querier = db.as_ref();
                Ok(querier)
            }
            Target::Tx(core) => {
                if core.controller.is_done() {
                    return Err(Error::TransactionDone);
                }
                let querier: &dyn Querier = core.driver.as_ref();
                Ok(querier)
            }
        }
    }

    fn executor(&self) -> Result<&dyn Executor> {
        match &self.target {
            Target::Pool(db) => {
                let executor: &dyn Executor = db.as_ref();
                Ok(executor)
            }
            Target::Tx(core) => {
                if core.controller.is_done() {
                    return Err(Error::TransactionDone);
                }
                let executor: &dyn Executor = core.driver.as_ref();
                Ok(executor)
            }
        }
    }

    fn tx(&self) -> Option<&Arc<TxCore>> {
        match &self.target {
            Target::Tx(core) => Some(core),
            Target::Pool(_) => None,
        }
    }

    pub(crate) fn arena(&self) -> &Weak<Mutex<ValueArena>> {
        &self.arena
    }
}

/// Recyclable part of a session.
#[derive(Default)]
pub(crate) struct SessionState {
    bound: Option<Bound>,
    /// Set on root sessions only.
    arena: Option<Arc<Mutex<ValueArena>>>,
}

impl Recycle for SessionState {
    fn recycle(&mut self) {
        self.bound = None;
        self.arena = None;
    }
}

/// A handle for running statements, bound to the pool or to a transaction.
///
/// A session serves one logical caller at a time. Closing it (explicitly or
/// by dropping it) returns its state to the pool; closing the root session
/// also releases every scan slot borrowed by its tree.
pub struct Session {
    state: Option<Box<SessionState>>,
    shared: Arc<Shared>,
}

impl Session {
    pub(crate) fn root(shared: Arc<Shared>) -> Self {
        let arena = Arc::new(Mutex::new(ValueArena::with_config(
            Arc::clone(&shared.value_pool),
            &shared.config.pool,
        )));
        let mut state = shared.sessions.get_or_else(Box::default);
        state.bound = Some(Bound {
            target: Target::Pool(Arc::clone(&shared.db)),
            arena: Arc::downgrade(&arena),
        });
        state.arena = Some(arena);
        Self {
            state: Some(state),
            shared,
        }
    }

    fn child(shared: Arc<Shared>, bound: Bound) -> Self {
        let mut state = shared.sessions.get_or_else(Box::default);
        state.bound = Some(bound);
        Self {
            state: Some(state),
            shared,
        }
    }

    fn bound(&self) -> Result<&Bound> {
        self.state
            .as_ref()
            .and_then(|state| state.bound.as_ref())
            .ok_or(Error::Closed(Resource::Session))
    }

    /// Run a statement that returns rows.
    pub async fn query(&self, ctx: &Context, sql: &str, params: &[&dyn ToSql]) -> Result<Cursor> {
        let bound = self.bound()?;
        let params = to_params(params)?;
        run_query(&self.shared, bound, ctx.clone(), sql, &params).await
    }

    /// Run a statement that returns no rows.
    pub async fn exec(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<ExecResult> {
        let bound = self.bound()?;
        let params = to_params(params)?;
        run_exec(&self.shared, bound, ctx.clone(), sql, &params).await
    }

    /// Run a query and map every row.
    pub async fn select<T: FromRow>(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<T>> {
        self.select_rows(ctx, sql, params, false).await
    }

    /// Run a query and map its first row.
    ///
    /// Returns [`Error::NoRows`] when the result set is empty.
    pub async fn get<T: FromRow>(&self, ctx: &Context, sql: &str, params: &[&dyn ToSql]) -> Result<T> {
        let mut rows = self.select_rows(ctx, sql, params, true).await?;
        rows.pop().ok_or(Error::NoRows)
    }

    async fn select_rows<T: FromRow>(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[&dyn ToSql],
        single: bool,
    ) -> Result<Vec<T>> {
        let bound = self.bound()?;
        bound.querier()?;
        let params = to_params(params)?;
        let target = SelectTarget {
            type_name: type_name::<T>(),
            single,
        };
        let stmt = Statement {
            sql,
            params: &params,
        };

        let ctx = match self.shared.hooks.before_select(ctx.clone(), &target, &stmt) {
            Ok(ctx) => ctx,
            Err(err) => {
                self.shared.metrics.record_aborted();
                return Err(err);
            }
        };

        let result = async {
            let mut cursor = driver_query(&self.shared, bound, &ctx, sql, &params).await?;
            let mut out = Vec::new();
            while let Some(row) = cursor.fetch_one().await? {
                out.push(T::from_row(&row)?);
                if single {
                    break;
                }
            }
            cursor.close().await?;
            if single && out.is_empty() {
                return Err(Error::NoRows);
            }
            Ok(out)
        }
        .await;

        self.shared
            .hooks
            .after_select(&ctx, &target, &stmt, result.as_ref().map(Vec::len));
        result
    }

    /// Open a transaction, or join the current one one level deeper.
    pub async fn begin(&self, ctx: &Context) -> Result<Session> {
        self.begin_with(ctx, TxOptions::default()).await
    }

    /// Like [`Session::begin`], with options for a new real transaction.
    ///
    /// The options are ignored when joining an open transaction.
    pub async fn begin_with(&self, ctx: &Context, opts: TxOptions) -> Result<Session> {
        let bound = self.bound()?;
        let shared = &self.shared;
        if bound.tx().is_some_and(|core| core.controller.is_done()) {
            return Err(Error::TransactionDone);
        }

        let ctx = match shared.hooks.before_begin(ctx.clone(), &opts) {
            Ok(ctx) => ctx,
            Err(err) => {
                shared.metrics.record_aborted();
                return Err(err);
            }
        };

        let result = match &bound.target {
            Target::Tx(core) => core.controller.enter().map(|depth| {
                tracing::trace!(depth, "BEGIN (nested)");
                (bound.clone(), depth)
            }),
            Target::Pool(db) => {
                let call_ctx = ctx.clone().or_timeout(shared.config.command_timeout);
                let start = Instant::now();
                let opened = call_ctx
                    .run(async { db.begin(&call_ctx, &opts).await.map_err(Error::Driver) })
                    .instrument(instrumentation::begin_span())
                    .await;
                shared
                    .metrics
                    .record_call(Op::Begin, "BEGIN", start, opened.is_ok(), shared.config.query_timers);
                match opened {
                    Ok(driver) => {
                        tracing::trace!(isolation = opts.isolation.name(), "BEGIN");
                        let bound = Bound {
                            target: Target::Tx(Arc::new(TxCore::new(driver))),
                            arena: bound.arena.clone(),
                        };
                        Ok((bound, 1))
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to begin transaction");
                        Err(err)
                    }
                }
            }
        };

        shared
            .hooks
            .after_begin(&ctx, &opts, result.as_ref().map(|(_, depth)| *depth));
        let (bound, _) = result?;
        Ok(Session::child(Arc::clone(shared), bound))
    }

    /// Commit the current scope.
    ///
    /// Inner scopes only unwind the nesting depth; the outermost scope
    /// commits the real transaction. Returns [`Error::NotInTransaction`] on
    /// a session that is not in a transaction.
    pub async fn commit(&self, ctx: &Context) -> Result<()> {
        self.end(ctx, false).await
    }

    /// Roll back the current scope.
    ///
    /// Inner scopes only unwind the nesting depth; the outermost scope
    /// rolls back the real transaction. Returns [`Error::NotInTransaction`]
    /// on a session that is not in a transaction.
    pub async fn rollback(&self, ctx: &Context) -> Result<()> {
        self.end(ctx, true).await
    }

    async fn end(&self, ctx: &Context, rollback: bool) -> Result<()> {
        let bound = self.bound()?;
        let core = bound.tx().ok_or(Error::NotInTransaction)?;
        if core.controller.is_done() {
            return Err(Error::TransactionDone);
        }
        let hooks = &self.shared.hooks;

        let allowed = if rollback {
            hooks.before_rollback(ctx)
        } else {
            hooks.before_commit(ctx)
        };
        if let Err(err) = allowed {
            self.shared.metrics.record_aborted();
            return Err(err);
        }

        let result = finish(&self.shared, core, ctx, rollback).await;

        let outcome = result.as_ref().map(|_| ());
        if rollback {
            hooks.after_rollback(ctx, outcome);
        } else {
            hooks.after_commit(ctx, outcome);
        }
        result
    }

    /// Run `f` inside a transaction.
    ///
    /// Begins a transaction (nested if this session is already in one) and
    /// hands it to `f`. If `f` returns an error or panics, the transaction
    /// is rolled back and the error is returned; a panic becomes
    /// [`Error::Recovered`]. A failing rollback is logged and counted in the
    /// `rollback_failures` meter but never replaces the original error.
    /// Otherwise the transaction is committed and a commit failure is
    /// returned. If `f` commits or rolls back its scope itself, that
    /// outcome stands and nothing further is sent to the driver.
    ///
    /// ```rust,ignore
    /// let id = session
    ///     .run_in_tx(&ctx, |tx| {
    ///         let ctx = ctx.clone();
    ///         Box::pin(async move {
    ///             let res = tx.exec(&ctx, "INSERT INTO users (name) VALUES (?)", &[&"ann"]).await?;
    ///             tx.exec(&ctx, "INSERT INTO audit (user_id) VALUES (?)", &[&res.last_insert_id]).await?;
    ///             Ok(res.last_insert_id)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_in_tx<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Session) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let mut tx = self.begin(ctx).await?;
        let depth = tx.depth();

        let outcome = {
            let tx_ref = &mut tx;
            match std::panic::catch_unwind(AssertUnwindSafe(move || f(tx_ref))) {
                Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Err(recovered(payload)),
                },
                Err(payload) => Err(recovered(payload)),
            }
        };

        // `f` may have ended its scope itself; that scope is then already
        // committed or rolled back and must not be ended twice.
        let ended = tx.depth() < depth;
        let result = match outcome {
            Ok(value) if ended => Ok(value),
            Ok(value) => match tx.commit(ctx).await {
                Ok(()) | Err(Error::TransactionDone) => Ok(value),
                Err(err) => Err(err),
            },
            Err(err) if ended => Err(err),
            Err(err) => {
                match tx.rollback(ctx).await {
                    Ok(()) | Err(Error::TransactionDone) => {}
                    Err(rollback_err) => {
                        self.shared.metrics.record_rollback_failure();
                        tracing::error!(
                            error = %rollback_err,
                            cause = %err,
                            "rollback failed after transaction error"
                        );
                    }
                }
                Err(err)
            }
        };

        tx.close()?;
        result
    }

    /// Start [`Session::query`] on a background task.
    ///
    /// Must be called from within a Tokio runtime. Once submitted the call
    /// runs to completion even if the returned [`Completion`] is dropped.
    pub fn query_async(&self, ctx: &Context, sql: &str, params: &[&dyn ToSql]) -> Completion<Cursor> {
        let (bound, params) = match self.prepare_async(params) {
            Ok(prepared) => prepared,
            Err(err) => return Completion::ready(Err(err)),
        };
        let shared = Arc::clone(&self.shared);
        let ctx = ctx.clone();
        let sql = sql.to_string();
        Completion::spawn(async move { run_query(&shared, &bound, ctx, &sql, &params).await })
    }

    /// Start [`Session::exec`] on a background task.
    ///
    /// Must be called from within a Tokio runtime. Once submitted the call
    /// runs to completion even if the returned [`Completion`] is dropped.
    pub fn exec_async(
        &self,
        ctx: &Context,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Completion<ExecResult> {
        let (bound, params) = match self.prepare_async(params) {
            Ok(prepared) => prepared,
            Err(err) => return Completion::ready(Err(err)),
        };
        let shared = Arc::clone(&self.shared);
        let ctx = ctx.clone();
        let sql = sql.to_string();
        Completion::spawn(async move { run_exec(&shared, &bound, ctx, &sql, &params).await })
    }

    fn prepare_async(&self, params: &[&dyn ToSql]) -> Result<(Bound, Vec<SqlValue>)> {
        let bound = self.bound()?.clone();
        let params = to_params(params)?;
        Ok((bound, params))
    }

    /// Borrow a scan slot from this session tree's arena.
    ///
    /// The slot stays valid until the root session closes.
    pub fn acquire<T: Poolable>(&self) -> Result<Slot<T>> {
        let arena = self
            .bound()?
            .arena
            .upgrade()
            .ok_or(Error::Closed(Resource::Arena))?;
        let slot = arena.lock().acquire::<T>()?;
        Ok(slot)
    }

    /// Borrow a text slot.
    pub fn string(&self) -> Result<Slot<String>> {
        self.acquire()
    }

    /// Borrow an integer slot.
    pub fn int64(&self) -> Result<Slot<i64>> {
        self.acquire()
    }

    /// Borrow a float slot.
    pub fn float64(&self) -> Result<Slot<f64>> {
        self.acquire()
    }

    /// Borrow a boolean slot.
    pub fn bool(&self) -> Result<Slot<bool>> {
        self.acquire()
    }

    /// Whether this session is bound to a transaction.
    #[must_use]
    pub fn is_tx(&self) -> bool {
        self.bound().is_ok_and(|bound| bound.tx().is_some())
    }

    /// Nesting depth of the transaction, 0 outside one or once it finished.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.bound()
            .ok()
            .and_then(Bound::tx)
            .map_or(0, |core| core.controller.depth())
    }

    /// Whether [`Session::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }

    /// Return the session state to its pool.
    ///
    /// Closing the root session also releases every scan slot its tree
    /// borrowed; rows read through it then read as NULL. Closing twice is a
    /// no-op. A transaction session closed before commit or rollback leaves
    /// the transaction to be rolled back once its last handle is gone.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        if let Some(arena) = state.arena.take() {
            let mut arena = arena.lock();
            tracing::debug!(slots = arena.len(), "releasing session arena");
            arena.close();
        }
        self.shared.sessions.put(state);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.is_closed())
            .field("tx", &self.is_tx())
            .field("depth", &self.depth())
            .finish()
    }
}

fn recovered(payload: Box<dyn std::any::Any + Send>) -> Error {
    let panic = RecoveredPanic::new(payload);
    tracing::error!(panic = panic.message(), "panic in transaction callback");
    Error::Recovered(Box::new(panic))
}

/// Query with hooks.
async fn run_query(
    shared: &Arc<Shared>,
    bound: &Bound,
    ctx: Context,
    sql: &str,
    params: &[SqlValue],
) -> Result<Cursor> {
    bound.querier()?;
    let stmt = Statement { sql, params };
    let ctx = match shared.hooks.before_query(ctx, &stmt) {
        Ok(ctx) => ctx,
        Err(err) => {
            shared.metrics.record_aborted();
            return Err(err);
        }
    };

    let result = driver_query(shared, bound, &ctx, sql, params).await;
    shared.hooks.after_query(
        &ctx,
        &stmt,
        result.as_ref().map(|cursor| cursor.columns()),
    );
    result
}

/// Query without hooks: metrics, tracing and the driver call.
async fn driver_query(
    shared: &Arc<Shared>,
    bound: &Bound,
    ctx: &Context,
    sql: &str,
    params: &[SqlValue],
) -> Result<Cursor> {
    let querier = bound.querier()?;
    let ctx = ctx.clone().or_timeout(shared.config.command_timeout);
    let start = Instant::now();

    let result = ctx
        .run(async { querier.query(&ctx, sql, params).await.map_err(Error::Driver) })
        .instrument(instrumentation::query_span(sql, &shared.config.sanitization))
        .await;

    shared
        .metrics
        .record_call(Op::Query, sql, start, result.is_ok(), shared.config.query_timers);
    shared.metrics.record_connections(shared.db.open_connections());

    match result {
        Ok(source) => {
            let columns: Arc<[Column]> = source.columns().into();
            Ok(Cursor::new(
                Arc::clone(shared),
                source,
                columns,
                bound.arena().clone(),
            ))
        }
        Err(err) => {
            tracing::error!(error = %err, "query failed");
            Err(err)
        }
    }
}

/// Exec with hooks.
async fn run_exec(
    shared: &Arc<Shared>,
    bound: &Bound,
    ctx: Context,
    sql: &str,
    params: &[SqlValue],
) -> Result<ExecResult> {
    let executor = bound.executor()?;
    let stmt = Statement { sql, params };
    let ctx = match shared.hooks.before_exec(ctx, &stmt) {
        Ok(ctx) => ctx,
        Err(err) => {
            shared.metrics.record_aborted();
            return Err(err);
        }
    };

    let call_ctx = ctx.clone().or_timeout(shared.config.command_timeout);
    let span = instrumentation::exec_span(sql, &shared.config.sanitization);
    let start = Instant::now();

    let result = call_ctx
        .run(async { executor.exec(&call_ctx, sql, params).await.map_err(Error::Driver) })
        .instrument(span.clone())
        .await;

    shared
        .metrics
        .record_call(Op::Exec, sql, start, result.is_ok(), shared.config.query_timers);
    shared.metrics.record_connections(shared.db.open_connections());

    let result = result.map(|outcome| {
        let last_insert_id = outcome.last_insert_id.unwrap_or_else(|| {
            tracing::warn!(sql, "driver did not report a last insert id");
            0
        });
        let rows_affected = outcome.rows_affected.unwrap_or_else(|| {
            tracing::warn!(sql, "driver did not report rows affected");
            0
        });
        span.record("db.rows_affected", rows_affected);
        shared.metrics.record_affected(rows_affected);
        ExecResult {
            last_insert_id,
            rows_affected,
        }
    });
    if let Err(err) = &result {
        tracing::error!(error = %err, "exec failed");
    }

    shared.hooks.after_exec(&ctx, &stmt, result.as_ref());
    result
}

/// Unwind one scope of `core`, calling the driver for the outermost one.
async fn finish(shared: &Shared, core: &TxCore, ctx: &Context, rollback: bool) -> Result<()> {
    let (label, op) = if rollback {
        ("ROLLBACK", Op::Rollback)
    } else {
        ("COMMIT", Op::Commit)
    };

    match core.controller.exit(rollback)? {
        Exit::Nested { depth } => {
            tracing::trace!(depth, "{label} (nested)");
            Ok(())
        }
        Exit::Outermost { rollback_requested } => {
            if rollback_requested && !rollback {
                tracing::warn!("committing a transaction after an inner scope rolled back");
            }
            let ctx = ctx.clone().or_timeout(shared.config.command_timeout);
            let span = if rollback {
                instrumentation::rollback_span()
            } else {
                instrumentation::commit_span()
            };
            let start = Instant::now();

            let result = ctx
                .run(async {
                    let ended = if rollback {
                        core.driver.rollback().await
                    } else {
                        core.driver.commit().await
                    };
                    ended.map_err(Error::Driver)
                })
                .instrument(span)
                .await;

            shared
                .metrics
                .record_call(op, label, start, result.is_ok(), shared.config.query_timers);
            match &result {
                Ok(()) => tracing::trace!("{label}"),
                Err(err) => tracing::error!(error = %err, "{label} failed"),
            }
            result
        }
    }
}

/// Result of an operation running on a background task.
///
/// Resolves to [`Error::TaskFailed`] if the task ends without delivering a
/// result, for example because it panicked or the runtime shut down.
#[must_use = "the operation runs regardless; await the completion to see its result"]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T: Send + 'static> Completion<T> {
    fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            // The receiver may be gone; the result is dropped then.
            let _ = tx.send(fut.await);
        });
        Self { rx }
    }

    fn ready(result: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(Error::TaskFailed(
                    "operation task ended without a result".into(),
                ))
            })
        })
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}
