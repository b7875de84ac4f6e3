//! # sqlsession
//!
//! Pooled sessions, nested transactions, hooks and metrics on top of an
//! async SQL driver.
//!
//! This is the primary public API surface of the sqlsession workspace. A
//! driver implements the traits in [`driver`]; [`Db`] wraps it and hands out
//! [`Session`]s.
//!
//! ## Features
//!
//! - **Scan-slot recycling**: rows scan into nullable slots borrowed from a
//!   per-session-tree arena and returned in bulk when the root session
//!   closes
//! - **Nested transactions**: `begin` inside a transaction only deepens a
//!   counter; the driver sees one commit or rollback, at the outermost scope
//! - **Panic-safe transactions**: [`Session::run_in_tx`] rolls back on error
//!   or panic
//! - **Hooks**: optional pre/post callbacks around select, query, exec,
//!   begin, commit and rollback
//! - **Metrics**: per-operation meters, a connection histogram and one timer
//!   per query text
//!
//! ## Session tree
//!
//! ```text
//! Db::session()          root session, owns the value arena
//!   .begin()             tx session, depth 1   (driver BEGIN)
//!     .begin()           tx session, depth 2   (no driver call)
//!     .commit()          depth 1               (no driver call)
//!   .commit()            idle                  (driver COMMIT)
//! .close()               arena released
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlsession::{Context, Db, Hooks};
//!
//! let db = Db::builder(driver)
//!     .hooks(Hooks::new().post_exec(|_ctx, stmt, outcome| {
//!         tracing::info!(sql = stmt.sql, ok = outcome.is_ok(), "exec");
//!     }))
//!     .build()?;
//!
//! let ctx = Context::new();
//! let mut session = db.session()?;
//!
//! let tx = session.begin(&ctx).await?;
//! let res = tx.exec(&ctx, "INSERT INTO users (name) VALUES (?)", &[&"ann"]).await?;
//! tx.commit(&ctx).await?;
//!
//! let name: String = session
//!     .get(&ctx, "SELECT name FROM users WHERE id = ?", &[&res.last_insert_id])
//!     .await?;
//! session.close()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod cursor;
pub mod db;
pub mod driver;
pub mod error;
pub mod from_row;
pub mod hooks;
pub mod instrumentation;
pub mod metrics;
pub mod row;
pub mod session;
pub mod transaction;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use context::Context;
pub use cursor::Cursor;
pub use db::{Db, DbBuilder, PoolStats};
pub use driver::{
    Database, DriverResult, DriverTransaction, ExecOutcome, Executor, Querier, RowSource,
};
pub use error::{BoxError, Error, RecoveredPanic, Resource, Result};
pub use from_row::FromRow;
pub use hooks::{Hooks, SelectTarget, Statement};
pub use instrumentation::SanitizationConfig;
pub use metrics::{MetricsCollector, MetricsSnapshot, TimerSnapshot};
pub use row::{Column, Row};
pub use session::{Completion, ExecResult, Session};
pub use sqlsession_pool::{PoolConfig, Poolable, PooledValue, Slot, ValuePool};
pub use sqlsession_types::{
    FromSql, NullBool, NullFloat64, NullInt64, NullString, Nullable, SqlValue, ToSql, ValueKind,
};
pub use transaction::{IsolationLevel, TransactionController, TxOptions, TxState};
