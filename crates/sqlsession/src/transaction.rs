//! Transaction support.
//!
//! A session tree holds at most one real transaction. Nested `begin` calls
//! only deepen a counter kept by the [`TransactionController`]; commit and
//! rollback unwind it, and the driver is touched when the outermost scope
//! ends.
//!
//! ```text
//! Idle --begin--> Active(1) --begin--> Active(2) ...
//! Active(d) --commit/rollback--> Active(d-1)   (d > 1, no driver call)
//! Active(1) --commit/rollback--> Idle          (driver call)
//! ```

use parking_lot::Mutex;

use crate::driver::DriverTransaction;
use crate::error::{Error, Result};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Whatever the driver or server defaults to.
    #[default]
    Default,

    /// Read uncommitted (dirty reads allowed).
    ReadUncommitted,

    /// Read committed.
    ///
    /// Prevents dirty reads but allows non-repeatable reads and phantom
    /// reads.
    ReadCommitted,

    /// Repeatable read.
    ///
    /// Rows read by a transaction don't change during the transaction.
    RepeatableRead,

    /// Snapshot isolation.
    ///
    /// Uses row versioning to provide a point-in-time view of data.
    Snapshot,

    /// Serializable (highest isolation).
    Serializable,
}

impl IsolationLevel {
    /// Get the isolation level name as used in SQL.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Snapshot => "SNAPSHOT",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options for opening a real transaction.
///
/// Ignored by nested `begin` calls, which join the open transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct TxOptions {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Whether the transaction only reads.
    pub read_only: bool,
}

impl TxOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    #[must_use]
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Mark the transaction read-only.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Nesting state of a session tree's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// No transaction, or the transaction has finished.
    Idle,
    /// Open with the given nesting depth (always at least 1).
    Active(usize),
}

/// How a commit or rollback unwound the nesting counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    /// An inner scope ended; `depth` scopes remain.
    Nested { depth: usize },
    /// The outermost scope ended; the driver must be called.
    Outermost {
        /// An inner scope rolled back earlier.
        rollback_requested: bool,
    },
}

#[derive(Debug)]
struct ControllerState {
    state: TxState,
    rollback_requested: bool,
}

/// Tracks the nesting depth of one real transaction.
///
/// Starts at `Active(1)` because it is created when the real transaction
/// opens.
#[derive(Debug)]
pub struct TransactionController {
    inner: Mutex<ControllerState>,
}

impl Default for TransactionController {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionController {
    /// A controller for a freshly opened transaction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControllerState {
                state: TxState::Active(1),
                rollback_requested: false,
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TxState {
        self.inner.lock().state
    }

    /// Current depth, 0 when idle.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self.state() {
            TxState::Idle => 0,
            TxState::Active(depth) => depth,
        }
    }

    /// Whether the transaction has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state() == TxState::Idle
    }

    /// Enter a nested scope, returning the new depth.
    pub(crate) fn enter(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        match inner.state {
            TxState::Idle => Err(Error::TransactionDone),
            TxState::Active(depth) => {
                inner.state = TxState::Active(depth + 1);
                Ok(depth + 1)
            }
        }
    }

    /// Leave the current scope.
    ///
    /// The state moves to `Idle` before the caller talks to the driver, so
    /// the outermost exit is reported exactly once.
    pub(crate) fn exit(&self, rollback: bool) -> Result<Exit> {
        let mut inner = self.inner.lock();
        match inner.state {
            TxState::Idle => Err(Error::TransactionDone),
            TxState::Active(1) => {
                inner.state = TxState::Idle;
                Ok(Exit::Outermost {
                    rollback_requested: inner.rollback_requested,
                })
            }
            TxState::Active(depth) => {
                if rollback {
                    inner.rollback_requested = true;
                }
                inner.state = TxState::Active(depth - 1);
                Ok(Exit::Nested { depth: depth - 1 })
            }
        }
    }
}

/// A real driver transaction plus its nesting controller, shared by every
/// session handle in the transaction.
pub(crate) struct TxCore {
    pub(crate) driver: Box<dyn DriverTransaction>,
    pub(crate) controller: TransactionController,
}

impl TxCore {
    pub(crate) fn new(driver: Box<dyn DriverTransaction>) -> Self {
        Self {
            driver,
            controller: TransactionController::new(),
        }
    }
}

impl Drop for TxCore {
    fn drop(&mut self) {
        if let TxState::Active(depth) = self.controller.state() {
            tracing::warn!(
                depth = depth,
                "transaction dropped without commit or rollback; the driver will roll it back"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_names() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::Default);
        assert_eq!(IsolationLevel::ReadCommitted.name(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.name(), "SERIALIZABLE");
    }

    #[test]
    fn test_tx_options_builder() {
        let opts = TxOptions::new()
            .isolation(IsolationLevel::Snapshot)
            .read_only(true);
        assert_eq!(opts.isolation, IsolationLevel::Snapshot);
        assert!(opts.read_only);
    }

    #[test]
    fn test_single_scope_reaches_driver_once() {
        let controller = TransactionController::new();
        assert_eq!(controller.state(), TxState::Active(1));
        assert_eq!(
            controller.exit(false).unwrap(),
            Exit::Outermost {
                rollback_requested: false
            }
        );
        assert!(controller.is_done());
        assert!(matches!(controller.exit(false), Err(Error::TransactionDone)));
    }

    #[test]
    fn test_nested_scopes_unwind() {
        let controller = TransactionController::new();
        for expected in 2..=5 {
            assert_eq!(controller.enter().unwrap(), expected);
        }
        for remaining in (1..=4).rev() {
            assert_eq!(
                controller.exit(false).unwrap(),
                Exit::Nested { depth: remaining }
            );
        }
        assert!(matches!(
            controller.exit(false).unwrap(),
            Exit::Outermost { .. }
        ));
        assert_eq!(controller.depth(), 0);
    }

    #[test]
    fn test_inner_rollback_is_remembered() {
        let controller = TransactionController::new();
        controller.enter().unwrap();
        controller.exit(true).unwrap();
        assert_eq!(
            controller.exit(false).unwrap(),
            Exit::Outermost {
                rollback_requested: true
            }
        );
    }

    #[test]
    fn test_enter_after_done() {
        let controller = TransactionController::new();
        controller.exit(false).unwrap();
        assert!(matches!(controller.enter(), Err(Error::TransactionDone)));
    }
}
