//! Exponentially decaying reservoir sample.
//!
//! Forward-decay priority sampling: each value gets priority
//! `exp(alpha * age) / u` with `u` uniform in (0, 1], and the reservoir keeps
//! the highest priorities. Newer values therefore dominate, with roughly the
//! last five minutes weighted most for `alpha = 0.015`. Priorities are
//! rescaled hourly to keep the exponent bounded.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Default reservoir size.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// Default decay factor.
pub const DEFAULT_ALPHA: f64 = 0.015;

const RESCALE_THRESHOLD: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy)]
struct Entry {
    priority: f64,
    value: i64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

/// Reservoir of recent values, biased towards the newest.
#[derive(Debug)]
pub struct ExpDecaySample {
    reservoir_size: usize,
    alpha: f64,
    count: u64,
    start: Instant,
    next_rescale: Instant,
    /// Min-heap on priority.
    values: BinaryHeap<Reverse<Entry>>,
}

impl Default for ExpDecaySample {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVOIR_SIZE, DEFAULT_ALPHA)
    }
}

impl ExpDecaySample {
    /// A sample keeping at most `reservoir_size` values.
    #[must_use]
    pub fn new(reservoir_size: usize, alpha: f64) -> Self {
        let now = Instant::now();
        Self {
            reservoir_size,
            alpha,
            count: 0,
            start: now,
            next_rescale: now + RESCALE_THRESHOLD,
            values: BinaryHeap::with_capacity(reservoir_size),
        }
    }

    /// Record a value.
    pub fn update(&mut self, value: i64) {
        self.update_at(value, Instant::now());
    }

    pub(crate) fn update_at(&mut self, value: i64, now: Instant) {
        self.count += 1;

        let age = now.saturating_duration_since(self.start).as_secs_f64();
        let u = rand::random::<f64>().max(f64::MIN_POSITIVE);
        let entry = Entry {
            priority: (self.alpha * age).exp() / u,
            value,
        };

        if self.values.len() < self.reservoir_size {
            self.values.push(Reverse(entry));
        } else if self
            .values
            .peek()
            .is_some_and(|Reverse(lowest)| lowest.priority < entry.priority)
        {
            self.values.pop();
            self.values.push(Reverse(entry));
        }

        if now > self.next_rescale {
            self.rescale(now);
        }
    }

    fn rescale(&mut self, now: Instant) {
        let shift = now.saturating_duration_since(self.start).as_secs_f64();
        let factor = (-self.alpha * shift).exp();
        self.start = now;
        self.next_rescale = now + RESCALE_THRESHOLD;
        self.values = self
            .values
            .drain()
            .map(|Reverse(mut e)| {
                e.priority *= factor;
                Reverse(e)
            })
            .collect();
    }

    /// Values recorded, including those evicted from the reservoir.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Values currently in the reservoir.
    #[must_use]
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Copy of the reservoir, in no particular order.
    #[must_use]
    pub fn values(&self) -> Vec<i64> {
        self.values.iter().map(|Reverse(e)| e.value).collect()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        let now = Instant::now();
        self.count = 0;
        self.start = now;
        self.next_rescale = now + RESCALE_THRESHOLD;
        self.values.clear();
    }
}
