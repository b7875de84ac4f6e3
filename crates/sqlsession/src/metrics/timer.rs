//! Duration timers, one per distinct query text.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::histogram::Histogram;
use super::meter::Meter;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Duration distribution plus call rate.
///
/// Durations are recorded in nanoseconds and reported in milliseconds.
#[derive(Debug, Default)]
pub struct Timer {
    histogram: Histogram,
    meter: Meter,
}

impl Timer {
    /// An empty timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one duration.
    pub fn update(&self, elapsed: Duration) {
        let nanos = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.update(nanos);
        self.meter.mark(1);
    }

    /// Record the time since `start`.
    pub fn update_since(&self, start: Instant) {
        self.update(start.elapsed());
    }

    /// Calls recorded.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.meter.count()
    }

    /// Point-in-time statistics in milliseconds.
    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        let h = self.histogram.snapshot();
        TimerSnapshot {
            count: self.meter.count(),
            min: h.min as f64 / NANOS_PER_MILLI,
            max: h.max as f64 / NANOS_PER_MILLI,
            avg: h.mean / NANOS_PER_MILLI,
            rate1: self.meter.rate1(),
            p50: h.p50 / NANOS_PER_MILLI,
            p75: h.p75 / NANOS_PER_MILLI,
            p95: h.p95 / NANOS_PER_MILLI,
            p99: h.p99 / NANOS_PER_MILLI,
        }
    }
}

/// Serializable timer reading. Durations are milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimerSnapshot {
    /// Calls recorded.
    pub count: u64,
    /// Fastest call.
    pub min: f64,
    /// Slowest call.
    pub max: f64,
    /// Mean duration.
    pub avg: f64,
    /// One-minute call rate per second.
    pub rate1: f64,
    /// Median.
    pub p50: f64,
    /// 75th percentile.
    pub p75: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

/// Timers keyed by literal query text.
///
/// The first measurement of a query creates its timer; concurrent first
/// measurements of the same text still end up on one timer.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: DashMap<String, Arc<Timer>>,
}

impl TimerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the time since `start` against `query`.
    pub fn measure(&self, query: &str, start: Instant) {
        self.timer_for(query).update_since(start);
    }

    fn timer_for(&self, query: &str) -> Arc<Timer> {
        if let Some(timer) = self.timers.get(query) {
            return Arc::clone(timer.value());
        }
        Arc::clone(
            self.timers
                .entry(query.to_string())
                .or_insert_with(|| Arc::new(Timer::new()))
                .value(),
        )
    }

    /// The timer for `query`, if it was ever measured.
    #[must_use]
    pub fn get(&self, query: &str) -> Option<Arc<Timer>> {
        self.timers.get(query).map(|t| Arc::clone(t.value()))
    }

    /// Snapshots of every timer, ordered by query text.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, TimerSnapshot> {
        self.timers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Drop every timer.
    pub fn reset(&self) {
        self.timers.clear();
    }

    /// Number of distinct queries measured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether nothing was measured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
