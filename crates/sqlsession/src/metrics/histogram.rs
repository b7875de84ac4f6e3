//! Histogram over an exponentially decaying sample.

use parking_lot::Mutex;
use serde::Serialize;

use super::sample::ExpDecaySample;

/// Distribution of recent values.
#[derive(Debug, Default)]
pub struct Histogram {
    sample: Mutex<ExpDecaySample>,
}

impl Histogram {
    /// A histogram with the default reservoir.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A histogram over a custom sample.
    #[must_use]
    pub fn with_sample(sample: ExpDecaySample) -> Self {
        Self {
            sample: Mutex::new(sample),
        }
    }

    /// Record a value.
    pub fn update(&self, value: i64) {
        self.sample.lock().update(value);
    }

    /// Forget every value.
    pub fn clear(&self) {
        self.sample.lock().clear();
    }

    /// Values recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.sample.lock().count()
    }

    /// Statistics over the current reservoir.
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let (count, mut values) = {
            let sample = self.sample.lock();
            (sample.count(), sample.values())
        };
        HistogramSnapshot::from_values(count, &mut values)
    }
}

/// Serializable histogram statistics.
///
/// All fields are zero for an empty histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    /// Values recorded, including those evicted from the reservoir.
    pub count: u64,
    /// Smallest value in the reservoir.
    pub min: i64,
    /// Largest value in the reservoir.
    pub max: i64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// Median.
    pub p50: f64,
    /// 75th percentile.
    pub p75: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl HistogramSnapshot {
    pub(crate) fn from_values(count: u64, values: &mut [i64]) -> Self {
        if values.is_empty() {
            return Self {
                count,
                ..Self::default()
            };
        }
        values.sort_unstable();

        let n = values.len() as f64;
        let sum: f64 = values.iter().map(|v| *v as f64).sum();
        let mean = sum / n;
        let variance = values
            .iter()
            .map(|v| {
                let d = *v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        Self {
            count,
            min: values[0],
            max: values[values.len() - 1],
            mean,
            stddev: variance.sqrt(),
            p50: percentile(values, 0.5),
            p75: percentile(values, 0.75),
            p95: percentile(values, 0.95),
            p99: percentile(values, 0.99),
        }
    }
}

/// Percentile of sorted, non-empty `values`, interpolating between ranks.
fn percentile(values: &[i64], p: f64) -> f64 {
    let n = values.len();
    let pos = p * (n as f64 + 1.0);
    if pos < 1.0 {
        values[0] as f64
    } else if pos >= n as f64 {
        values[n - 1] as f64
    } else {
        let lower = values[pos as usize - 1] as f64;
        let upper = values[pos as usize] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_is_zero() {
        let snapshot = Histogram::new().snapshot();
        assert_eq!(snapshot, HistogramSnapshot::default());
    }

    #[test]
    fn test_one_to_hundred() {
        let histogram = Histogram::new();
        for v in 1..=100 {
            histogram.update(v);
        }
        let s = histogram.snapshot();
        assert_eq!(s.count, 100);
        assert_eq!(s.min, 1);
        assert_eq!(s.max, 100);
        assert!((s.mean - 50.5).abs() < 1e-9);
        assert!((s.p50 - 50.5).abs() < 1e-9);
        assert!((s.p75 - 75.75).abs() < 1e-9);
        assert!((s.p99 - 99.99).abs() < 1e-9);
        assert!((s.stddev - 28.866_070_047_722_118).abs() < 1e-9);
    }

    #[test]
    fn test_single_value() {
        let histogram = Histogram::new();
        histogram.update(42);
        let s = histogram.snapshot();
        assert_eq!((s.min, s.max), (42, 42));
        assert_eq!(s.p50, 42.0);
        assert_eq!(s.p99, 42.0);
        assert_eq!(s.stddev, 0.0);
    }

    #[test]
    fn test_clear() {
        let histogram = Histogram::new();
        histogram.update(1);
        histogram.clear();
        assert_eq!(histogram.count(), 0);
    }
}
