//! Operation counters, rates and timings.
//!
//! One [`MetricsCollector`] is shared by every session of a [`Db`](crate::Db)
//! (or several, when injected through the builder). It keeps:
//!
//! - a [`Meter`] per operation kind, counting calls that reached the driver,
//!   plus meters for fetched rows, affected rows, rollback failures and
//!   errors;
//! - a [`Histogram`] of open-connection samples taken on each query and exec
//!   when the driver reports them;
//! - a [`TimerRegistry`] with one [`Timer`] per literal query text.
//!
//! [`MetricsCollector::snapshot`] returns a serializable copy of everything.

mod histogram;
mod meter;
mod sample;
mod timer;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

pub use histogram::{Histogram, HistogramSnapshot};
pub use meter::{Meter, MeterSnapshot, TICK_INTERVAL};
pub use sample::{DEFAULT_ALPHA, DEFAULT_RESERVOIR_SIZE, ExpDecaySample};
pub use timer::{Timer, TimerRegistry, TimerSnapshot};

/// Which operation a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Query,
    Exec,
    Begin,
    Commit,
    Rollback,
}

/// Metrics shared by the sessions of a database handle.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    queries: Meter,
    executes: Meter,
    rows: Meter,
    affects: Meter,
    begins: Meter,
    commits: Meter,
    rollbacks: Meter,
    rollback_failures: Meter,
    errors: Meter,
    connections: Histogram,
    timers: TimerRegistry,
}

impl MetricsCollector {
    /// A collector with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector ready to be shared.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Point-in-time copy of every metric.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries: self.queries.snapshot(),
            executes: self.executes.snapshot(),
            rows: self.rows.snapshot(),
            affects: self.affects.snapshot(),
            begins: self.begins.snapshot(),
            commits: self.commits.snapshot(),
            rollbacks: self.rollbacks.snapshot(),
            rollback_failures: self.rollback_failures.snapshot(),
            errors: self.errors.snapshot(),
            connections: self.connections.snapshot(),
            timers: self.timers.snapshot(),
        }
    }

    /// Snapshots of the per-query timers.
    #[must_use]
    pub fn timers(&self) -> BTreeMap<String, TimerSnapshot> {
        self.timers.snapshot()
    }

    /// The timer for one query text, if it was measured.
    #[must_use]
    pub fn timer(&self, query: &str) -> Option<Arc<Timer>> {
        self.timers.get(query)
    }

    /// Drop every per-query timer.
    pub fn reset_timers(&self) {
        self.timers.reset();
    }

    /// Queries that reached the driver.
    #[must_use]
    pub fn queries(&self) -> &Meter {
        &self.queries
    }

    /// Execs that reached the driver.
    #[must_use]
    pub fn executes(&self) -> &Meter {
        &self.executes
    }

    /// Rows fetched through cursors.
    #[must_use]
    pub fn rows(&self) -> &Meter {
        &self.rows
    }

    /// Rows reported changed by execs.
    #[must_use]
    pub fn affects(&self) -> &Meter {
        &self.affects
    }

    /// Real transactions opened.
    #[must_use]
    pub fn begins(&self) -> &Meter {
        &self.begins
    }

    /// Real commits sent.
    #[must_use]
    pub fn commits(&self) -> &Meter {
        &self.commits
    }

    /// Real rollbacks sent.
    #[must_use]
    pub fn rollbacks(&self) -> &Meter {
        &self.rollbacks
    }

    /// Rollbacks that failed while unwinding another error.
    #[must_use]
    pub fn rollback_failures(&self) -> &Meter {
        &self.rollback_failures
    }

    /// Failed operations, including those aborted by a pre-hook.
    #[must_use]
    pub fn errors(&self) -> &Meter {
        &self.errors
    }

    /// Open-connection samples.
    #[must_use]
    pub fn connections(&self) -> &Histogram {
        &self.connections
    }

    pub(crate) fn record_aborted(&self) {
        self.errors.mark(1);
    }

    /// Count one driver call and, when `timed`, its duration.
    pub(crate) fn record_call(&self, op: Op, sql: &str, start: Instant, ok: bool, timed: bool) {
        let meter = match op {
            Op::Query => &self.queries,
            Op::Exec => &self.executes,
            Op::Begin => &self.begins,
            Op::Commit => &self.commits,
            Op::Rollback => &self.rollbacks,
        };
        meter.mark(1);
        if !ok {
            self.errors.mark(1);
        }
        if timed {
            self.timers.measure(sql, start);
        }
    }

    pub(crate) fn record_connections(&self, open: Option<usize>) {
        if let Some(open) = open {
            self.connections
                .update(i64::try_from(open).unwrap_or(i64::MAX));
        }
    }

    pub(crate) fn record_rows(&self, n: u64) {
        self.rows.mark(n);
    }

    pub(crate) fn record_affected(&self, n: u64) {
        self.affects.mark(n);
    }

    pub(crate) fn record_rollback_failure(&self) {
        self.rollback_failures.mark(1);
    }
}

/// Serializable copy of a [`MetricsCollector`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Queries that reached the driver.
    pub queries: MeterSnapshot,
    /// Execs that reached the driver.
    pub executes: MeterSnapshot,
    /// Rows fetched.
    pub rows: MeterSnapshot,
    /// Rows affected.
    pub affects: MeterSnapshot,
    /// Real transactions opened.
    pub begins: MeterSnapshot,
    /// Real commits.
    pub commits: MeterSnapshot,
    /// Real rollbacks.
    pub rollbacks: MeterSnapshot,
    /// Failed rollbacks while unwinding another error.
    pub rollback_failures: MeterSnapshot,
    /// Failed operations.
    pub errors: MeterSnapshot,
    /// Open-connection samples.
    pub connections: HistogramSnapshot,
    /// Per-query timers.
    pub timers: BTreeMap<String, TimerSnapshot>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_call_counts_and_times() {
        let metrics = MetricsCollector::new();
        let start = Instant::now();
        metrics.record_call(Op::Query, "SELECT 1", start, true, true);
        metrics.record_call(Op::Query, "SELECT 1", start, false, true);
        metrics.record_call(Op::Exec, "DELETE FROM t", start, true, false);

        let s = metrics.snapshot();
        assert_eq!(s.queries.count, 2);
        assert_eq!(s.executes.count, 1);
        assert_eq!(s.errors.count, 1);
        assert_eq!(s.timers.len(), 1);
        assert_eq!(s.timers["SELECT 1"].count, 2);
    }

    #[test]
    fn test_aborted_only_counts_error() {
        let metrics = MetricsCollector::new();
        metrics.record_aborted();
        assert_eq!(metrics.errors().count(), 1);
        assert_eq!(metrics.queries().count(), 0);
    }

    #[test]
    fn test_connection_samples() {
        let metrics = MetricsCollector::new();
        metrics.record_connections(None);
        metrics.record_connections(Some(3));
        metrics.record_connections(Some(5));
        let s = metrics.snapshot().connections;
        assert_eq!(s.count, 2);
        assert_eq!((s.min, s.max), (3, 5));
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = MetricsCollector::new();
        metrics.record_rows(4);
        metrics.record_call(Op::Commit, "COMMIT", Instant::now(), true, true);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["rows"]["count"], 4);
        assert_eq!(json["commits"]["count"], 1);
        assert!(json["timers"]["COMMIT"]["p99"].is_number());
    }

    #[test]
    fn test_reset_timers() {
        let metrics = MetricsCollector::new();
        metrics.record_call(Op::Query, "SELECT 1", Instant::now(), true, true);
        metrics.reset_timers();
        assert!(metrics.timers().is_empty());
        assert_eq!(metrics.queries().count(), 1);
    }
}
