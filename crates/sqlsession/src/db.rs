//! The database handle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use sqlsession_pool::{ObjectPool, ObjectPoolStats, ValuePool, ValuePoolStats};

use crate::config::Config;
use crate::context::Context;
use crate::cursor::CursorState;
use crate::driver::Database;
use crate::error::{Error, Resource, Result};
use crate::hooks::Hooks;
use crate::metrics::MetricsCollector;
use crate::session::{Session, SessionState};

/// State shared by a [`Db`] and every session and cursor it hands out.
pub(crate) struct Shared {
    pub(crate) db: Arc<dyn Database>,
    pub(crate) hooks: Hooks,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) value_pool: Arc<ValuePool>,
    pub(crate) sessions: ObjectPool<Box<SessionState>>,
    pub(crate) cursors: ObjectPool<Box<CursorState>>,
    pub(crate) config: Config,
    closed: AtomicBool,
}

impl Shared {
    fn new(
        db: Arc<dyn Database>,
        config: Config,
        hooks: Hooks,
        metrics: Option<Arc<MetricsCollector>>,
        value_pool: Option<Arc<ValuePool>>,
    ) -> Self {
        let pool = &config.pool;
        Self {
            db,
            hooks,
            metrics: metrics.unwrap_or_else(MetricsCollector::shared),
            value_pool: value_pool.unwrap_or_else(|| Arc::new(ValuePool::new(pool))),
            sessions: ObjectPool::with_enabled(pool.max_idle_objects, pool.session_pool),
            cursors: ObjectPool::with_enabled(pool.max_idle_objects, pool.cursor_pool),
            config,
            closed: AtomicBool::new(false),
        }
    }
}

/// A pooled database with hooks and metrics.
///
/// Cheap to clone; clones share the driver, pools and metrics.
///
/// # Example
///
/// ```rust,ignore
/// use sqlsession::{Context, Db};
///
/// let db = Db::new(driver);
/// let ctx = Context::new();
///
/// let session = db.session()?;
/// let users: Vec<String> = session
///     .select(&ctx, "SELECT name FROM users WHERE active = ?", &[&true])
///     .await?;
/// ```
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
}

impl Db {
    /// Wrap a driver with the default configuration.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            shared: Arc::new(Shared::new(db, Config::default(), Hooks::default(), None, None)),
        }
    }

    /// Start building a handle around `db`.
    #[must_use]
    pub fn builder(db: Arc<dyn Database>) -> DbBuilder {
        DbBuilder {
            db,
            config: Config::default(),
            hooks: Hooks::default(),
            metrics: None,
            value_pool: None,
        }
    }

    /// Open a root session.
    pub fn session(&self) -> Result<Session> {
        if self.is_closed() {
            return Err(Error::Closed(Resource::Database));
        }
        Ok(Session::root(Arc::clone(&self.shared)))
    }

    /// Run `f` in a transaction on a fresh root session.
    ///
    /// See [`Session::run_in_tx`]. The session is closed afterwards, so rows
    /// read inside `f` must be copied out rather than returned.
    pub async fn run_in_tx<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Session) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let mut session = self.session()?;
        let result = session.run_in_tx(ctx, f).await;
        session.close()?;
        result
    }

    /// Check the database is reachable.
    pub async fn ping(&self, ctx: &Context) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed(Resource::Database));
        }
        let ctx = ctx.clone().or_timeout(self.shared.config.command_timeout);
        ctx.run(async { self.shared.db.ping(&ctx).await.map_err(Error::Driver) })
            .await
    }

    /// Close the driver. Later calls to [`Db::session`] fail.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(stats = ?self.pool_stats(), "closing database");
        self.shared.db.close().await.map_err(|err| {
            tracing::error!(error = %err, "failed to close database");
            Error::Driver(err)
        })
    }

    /// Whether [`Db::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// The shared metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.shared.metrics
    }

    /// The value pool behind every session arena.
    #[must_use]
    pub fn value_pool(&self) -> &Arc<ValuePool> {
        &self.shared.value_pool
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Current pool statistics.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            values: self.shared.value_pool.stats(),
            sessions: self.shared.sessions.stats(),
            cursors: self.shared.cursors.stats(),
        }
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("config", &self.shared.config)
            .field("hooks", &self.shared.hooks)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Statistics about the pools behind a [`Db`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Scan slots.
    pub values: ValuePoolStats,
    /// Session states.
    pub sessions: ObjectPoolStats,
    /// Cursor states.
    pub cursors: ObjectPoolStats,
}

/// Builder for [`Db`].
pub struct DbBuilder {
    db: Arc<dyn Database>,
    config: Config,
    hooks: Hooks,
    metrics: Option<Arc<MetricsCollector>>,
    value_pool: Option<Arc<ValuePool>>,
}

impl DbBuilder {
    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Install hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Record into an existing collector instead of a private one.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Borrow scan slots from an existing pool instead of a private one.
    #[must_use]
    pub fn value_pool(mut self, pool: Arc<ValuePool>) -> Self {
        self.value_pool = Some(pool);
        self
    }

    /// Validate the configuration and build the handle.
    pub fn build(self) -> Result<Db> {
        self.config.validate()?;
        Ok(Db {
            shared: Arc::new(Shared::new(
                self.db,
                self.config,
                self.hooks,
                self.metrics,
                self.value_pool,
            )),
        })
    }
}

impl fmt::Debug for DbBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbBuilder")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
