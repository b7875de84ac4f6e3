//! Pre/post interception around session operations.
//!
//! Each of select, query, exec, begin, commit and rollback has an optional
//! pre-hook and post-hook. Hooks run synchronously on the calling task.
//!
//! A pre-hook receives the operation's [`Context`] and may return a
//! replacement, which is used for the driver call and passed to the
//! post-hook. Returning an error aborts the operation: the driver is not
//! called, the post-hook does not run, and the error reaches the caller
//! unchanged. The post-hook sees the outcome but cannot change it.
//!
//! ```rust
//! use sqlsession::{Error, Hooks};
//!
//! let hooks = Hooks::new()
//!     .pre_exec(|ctx, stmt| {
//!         if stmt.sql.starts_with("DROP") {
//!             return Err(Error::hook("DROP is not allowed"));
//!         }
//!         Ok(ctx)
//!     })
//!     .post_query(|_ctx, stmt, outcome| {
//!         if let Err(err) = outcome {
//!             eprintln!("{} failed: {err}", stmt.sql);
//!         }
//!     });
//! # drop(hooks);
//! ```

use std::fmt;
use std::sync::Arc;

use sqlsession_types::SqlValue;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::row::Column;
use crate::session::ExecResult;
use crate::transaction::TxOptions;

/// The statement an operation runs.
#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    /// SQL text.
    pub sql: &'a str,
    /// Flattened parameters.
    pub params: &'a [SqlValue],
}

/// Describes where a select maps its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectTarget {
    /// Rust type name of one mapped row.
    pub type_name: &'static str,
    /// `true` for single-row `get`, `false` for `select`.
    pub single: bool,
}

/// Pre-hook for select.
pub type PreSelectHook =
    Arc<dyn Fn(Context, &SelectTarget, &Statement<'_>) -> Result<Context> + Send + Sync>;
/// Post-hook for select; receives the number of mapped rows.
pub type PostSelectHook =
    Arc<dyn Fn(&Context, &SelectTarget, &Statement<'_>, std::result::Result<usize, &Error>) + Send + Sync>;
/// Pre-hook for query or exec.
pub type PreStatementHook = Arc<dyn Fn(Context, &Statement<'_>) -> Result<Context> + Send + Sync>;
/// Post-hook for query; receives the result set's columns.
pub type PostQueryHook =
    Arc<dyn Fn(&Context, &Statement<'_>, std::result::Result<&[Column], &Error>) + Send + Sync>;
/// Post-hook for exec.
pub type PostExecHook =
    Arc<dyn Fn(&Context, &Statement<'_>, std::result::Result<&ExecResult, &Error>) + Send + Sync>;
/// Pre-hook for begin.
pub type PreBeginHook = Arc<dyn Fn(Context, &TxOptions) -> Result<Context> + Send + Sync>;
/// Post-hook for begin; receives the nesting depth reached.
pub type PostBeginHook =
    Arc<dyn Fn(&Context, &TxOptions, std::result::Result<usize, &Error>) + Send + Sync>;
/// Pre-hook for commit or rollback.
pub type PreEndHook = Arc<dyn Fn(&Context) -> Result<()> + Send + Sync>;
/// Post-hook for commit or rollback.
pub type PostEndHook = Arc<dyn Fn(&Context, std::result::Result<(), &Error>) + Send + Sync>;

/// The set of installed hooks. Missing hooks are no-ops.
#[derive(Clone, Default)]
pub struct Hooks {
    pre_select: Option<PreSelectHook>,
    post_select: Option<PostSelectHook>,
    pre_query: Option<PreStatementHook>,
    post_query: Option<PostQueryHook>,
    pre_exec: Option<PreStatementHook>,
    post_exec: Option<PostExecHook>,
    pre_begin: Option<PreBeginHook>,
    post_begin: Option<PostBeginHook>,
    pre_commit: Option<PreEndHook>,
    post_commit: Option<PostEndHook>,
    pre_rollback: Option<PreEndHook>,
    post_rollback: Option<PostEndHook>,
}

impl Hooks {
    /// No hooks installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run before `select` and `get`.
    #[must_use]
    pub fn pre_select<F>(mut self, f: F) -> Self
    where
        F: Fn(Context, &SelectTarget, &Statement<'_>) -> Result<Context> + Send + Sync + 'static,
    {
        self.pre_select = Some(Arc::new(f));
        self
    }

    /// Run after `select` and `get`.
    #[must_use]
    pub fn post_select<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &SelectTarget, &Statement<'_>, std::result::Result<usize, &Error>)
            + Send
            + Sync
            + 'static,
    {
        self.post_select = Some(Arc::new(f));
        self
    }

    /// Run before `query`.
    #[must_use]
    pub fn pre_query<F>(mut self, f: F) -> Self
    where
        F: Fn(Context, &Statement<'_>) -> Result<Context> + Send + Sync + 'static,
    {
        self.pre_query = Some(Arc::new(f));
        self
    }

    /// Run after `query`.
    #[must_use]
    pub fn post_query<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &Statement<'_>, std::result::Result<&[Column], &Error>)
            + Send
            + Sync
            + 'static,
    {
        self.post_query = Some(Arc::new(f));
        self
    }

    /// Run before `exec`.
    #[must_use]
    pub fn pre_exec<F>(mut self, f: F) -> Self
    where
        F: Fn(Context, &Statement<'_>) -> Result<Context> + Send + Sync + 'static,
    {
        self.pre_exec = Some(Arc::new(f));
        self
    }

    /// Run after `exec`.
    #[must_use]
    pub fn post_exec<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &Statement<'_>, std::result::Result<&ExecResult, &Error>)
            + Send
            + Sync
            + 'static,
    {
        self.post_exec = Some(Arc::new(f));
        self
    }

    /// Run before `begin`.
    #[must_use]
    pub fn pre_begin<F>(mut self, f: F) -> Self
    where
        F: Fn(Context, &TxOptions) -> Result<Context> + Send + Sync + 'static,
    {
        self.pre_begin = Some(Arc::new(f));
        self
    }

    /// Run after `begin`.
    #[must_use]
    pub fn post_begin<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &TxOptions, std::result::Result<usize, &Error>) + Send + Sync + 'static,
    {
        self.post_begin = Some(Arc::new(f));
        self
    }

    /// Run before `commit`.
    #[must_use]
    pub fn pre_commit<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_commit = Some(Arc::new(f));
        self
    }

    /// Run after `commit`.
    #[must_use]
    pub fn post_commit<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, std::result::Result<(), &Error>) + Send + Sync + 'static,
    {
        self.post_commit = Some(Arc::new(f));
        self
    }

    /// Run before `rollback`.
    #[must_use]
    pub fn pre_rollback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_rollback = Some(Arc::new(f));
        self
    }

    /// Run after `rollback`.
    #[must_use]
    pub fn post_rollback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, std::result::Result<(), &Error>) + Send + Sync + 'static,
    {
        self.post_rollback = Some(Arc::new(f));
        self
    }

    pub(crate) fn before_select(
        &self,
        ctx: Context,
        target: &SelectTarget,
        stmt: &Statement<'_>,
    ) -> Result<Context> {
        match &self.pre_select {
            Some(hook) => hook(ctx, target, stmt),
            None => Ok(ctx),
        }
    }

    pub(crate) fn after_select(
        &self,
        ctx: &Context,
        target: &SelectTarget,
        stmt: &Statement<'_>,
        outcome: std::result::Result<usize, &Error>,
    ) {
        if let Some(hook) = &self.post_select {
            hook(ctx, target, stmt, outcome);
        }
    }

    pub(crate) fn before_query(&self, ctx: Context, stmt: &Statement<'_>) -> Result<Context> {
        match &self.pre_query {
            Some(hook) => hook(ctx, stmt),
            None => Ok(ctx),
        }
    }

    pub(crate) fn after_query(
        &self,
        ctx: &Context,
        stmt: &Statement<'_>,
        outcome: std::result::Result<&[Column], &Error>,
    ) {
        if let Some(hook) = &self.post_query {
            hook(ctx, stmt, outcome);
        }
    }

    pub(crate) fn before_exec(&self, ctx: Context, stmt: &Statement<'_>) -> Result<Context> {
        match &self.pre_exec {
            Some(hook) => hook(ctx, stmt),
            None => Ok(ctx),
        }
    }

    pub(crate) fn after_exec(
        &self,
        ctx: &Context,
        stmt: &Statement<'_>,
        outcome: std::result::Result<&ExecResult, &Error>,
    ) {
        if let Some(hook) = &self.post_exec {
            hook(ctx, stmt, outcome);
        }
    }

    pub(crate) fn before_begin(&self, ctx: Context, opts: &TxOptions) -> Result<Context> {
        match &self.pre_begin {
            Some(hook) => hook(ctx, opts),
            None => Ok(ctx),
        }
    }

    pub(crate) fn after_begin(
        &self,
        ctx: &Context,
        opts: &TxOptions,
        outcome: std::result::Result<usize, &Error>,
    ) {
        if let Some(hook) = &self.post_begin {
            hook(ctx, opts, outcome);
        }
    }

    pub(crate) fn before_commit(&self, ctx: &Context) -> Result<()> {
        match &self.pre_commit {
            Some(hook) => hook(ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn after_commit(&self, ctx: &Context, outcome: std::result::Result<(), &Error>) {
        if let Some(hook) = &self.post_commit {
            hook(ctx, outcome);
        }
    }

    pub(crate) fn before_rollback(&self, ctx: &Context) -> Result<()> {
        match &self.pre_rollback {
            Some(hook) => hook(ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn after_rollback(&self, ctx: &Context, outcome: std::result::Result<(), &Error>) {
        if let Some(hook) = &self.post_rollback {
            hook(ctx, outcome);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_select", &self.pre_select.is_some())
            .field("post_select", &self.post_select.is_some())
            .field("pre_query", &self.pre_query.is_some())
            .field("post_query", &self.post_query.is_some())
            .field("pre_exec", &self.pre_exec.is_some())
            .field("post_exec", &self.post_exec.is_some())
            .field("pre_begin", &self.pre_begin.is_some())
            .field("post_begin", &self.post_begin.is_some())
            .field("pre_commit", &self.pre_commit.is_some())
            .field("post_commit", &self.post_commit.is_some())
            .field("pre_rollback", &self.pre_rollback.is_some())
            .field("post_rollback", &self.post_rollback.is_some())
            .finish()
    }
}
