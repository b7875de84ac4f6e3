//! Event counter with a one-minute moving rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Interval between rate recalculations.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// After this many missed ticks the rate has decayed to zero for practical
/// purposes.
const MAX_CATCH_UP_TICKS: u64 = 720;

/// Exponentially weighted moving average, ticked every 5 seconds.
#[derive(Debug)]
struct Ewma {
    alpha: f64,
    /// Events per nanosecond.
    rate: f64,
    initialized: bool,
    uncounted: u64,
    last_tick: Instant,
}

impl Ewma {
    fn one_minute(now: Instant) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0).exp();
        Self {
            alpha,
            rate: 0.0,
            initialized: false,
            uncounted: 0,
            last_tick: now,
        }
    }

    fn tick(&mut self) {
        let instant = self.uncounted as f64 / TICK_INTERVAL.as_nanos() as f64;
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant - self.rate);
        } else {
            self.rate = instant;
            self.initialized = true;
        }
    }

    /// Apply every tick that elapsed before `now`.
    fn catch_up(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = (elapsed.as_nanos() / TICK_INTERVAL.as_nanos()) as u64;
        if ticks == 0 {
            return;
        }
        if ticks > MAX_CATCH_UP_TICKS {
            self.tick();
            self.rate = 0.0;
            self.last_tick = now;
            return;
        }
        for _ in 0..ticks {
            self.tick();
        }
        self.last_tick += TICK_INTERVAL * ticks as u32;
    }

    fn per_second(&self) -> f64 {
        self.rate * 1e9
    }
}

/// Counts events and tracks their one-minute rate.
///
/// Ticks are applied lazily on the next mark or read, so an idle meter costs
/// nothing.
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    ewma: Mutex<Ewma>,
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter {
    /// A zeroed meter.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            count: AtomicU64::new(0),
            ewma: Mutex::new(Ewma::one_minute(now)),
        }
    }

    /// Record `n` events.
    pub fn mark(&self, n: u64) {
        self.mark_at(n, Instant::now());
    }

    fn mark_at(&self, n: u64, now: Instant) {
        self.count.fetch_add(n, Ordering::Relaxed);
        let mut ewma = self.ewma.lock();
        ewma.catch_up(now);
        ewma.uncounted += n;
    }

    /// Total events recorded.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// One-minute moving rate in events per second.
    #[must_use]
    pub fn rate1(&self) -> f64 {
        self.rate1_at(Instant::now())
    }

    fn rate1_at(&self, now: Instant) -> f64 {
        let mut ewma = self.ewma.lock();
        ewma.catch_up(now);
        ewma.per_second()
    }

    /// Point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            count: self.count(),
            rate1: self.rate1(),
        }
    }
}

/// Serializable meter reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeterSnapshot {
    /// Total events.
    pub count: u64,
    /// One-minute rate in events per second.
    pub rate1: f64,
}
