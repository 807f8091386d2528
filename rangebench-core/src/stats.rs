//! Throughput and latency percentiles of a single run.

use std::fmt;
use std::time::Duration;

use crate::sweep::MIB;

/// Latencies observed for a single range read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LatencySample {
    /// Time from issuing the request until the response started arriving.
    pub first_byte: Duration,
    /// Time from issuing the request until the body was drained and closed.
    pub last_byte: Duration,
}

/// Summary statistics reported for each latency dimension.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Stat {
    /// Smallest observed value.
    Min,
    /// Largest observed value.
    Max,
    /// Arithmetic mean.
    Avg,
    /// 25th percentile.
    P25,
    /// Median.
    P50,
    /// 75th percentile.
    P75,
    /// 90th percentile.
    P90,
    /// 99th percentile.
    P99,
}

impl Stat {
    /// All statistics in report column order.
    pub const REPORT_ORDER: [Stat; 8] = [
        Stat::Avg,
        Stat::Min,
        Stat::P25,
        Stat::P50,
        Stat::P75,
        Stat::P90,
        Stat::P99,
        Stat::Max,
    ];
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stat::Min => "min",
            Stat::Max => "max",
            Stat::Avg => "avg",
            Stat::P25 => "p25",
            Stat::P50 => "p50",
            Stat::P75 => "p75",
            Stat::P90 => "p90",
            Stat::P99 => "p99",
        };
        f.write_str(name)
    }
}

/// Summary of one latency dimension, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencyStats {
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
    /// Arithmetic mean.
    pub avg: f64,
    /// 25th percentile.
    pub p25: f64,
    /// Median.
    pub p50: f64,
    /// 75th percentile.
    pub p75: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl LatencyStats {
    /// Returns the value of a single statistic.
    pub fn get(&self, stat: Stat) -> f64 {
        match stat {
            Stat::Min => self.min,
            Stat::Max => self.max,
            Stat::Avg => self.avg,
            Stat::P25 => self.p25,
            Stat::P50 => self.p50,
            Stat::P75 => self.p75,
            Stat::P90 => self.p90,
            Stat::P99 => self.p99,
        }
    }

    /// Summarizes the given durations.
    ///
    /// The slice is sorted in place. Returns all zeroes for an empty slice.
    fn from_durations(values: &mut [Duration]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self::default();
        }

        let total: u128 = values.iter().map(Duration::as_nanos).sum();
        let avg = total as f64 / n as f64 / NANOS_PER_MILLI;

        values.sort_unstable();
        let at = |percent| as_millis(values[percentile_index(n, percent)]);

        Self {
            min: as_millis(values[0]),
            max: as_millis(values[n - 1]),
            avg,
            p25: at(25),
            p50: at(50),
            p75: at(75),
            p90: at(90),
            p99: at(99),
        }
    }
}

const NANOS_PER_MILLI: f64 = 1_000_000.0;

fn as_millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / NANOS_PER_MILLI
}

/// Index of the `percent`-th percentile in an ascending list of `n` values.
///
/// This is `floor(n * percent / 100) - 1`, clamped into `[0, n - 1]`. With very few values,
/// neighboring percentiles may resolve to the same index.
pub fn percentile_index(n: usize, percent: u32) -> usize {
    let rank = n.saturating_mul(percent as usize) / 100;
    rank.saturating_sub(1).min(n.saturating_sub(1))
}

/// The aggregated result of one (payload size, thread count) run.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkRun {
    /// Size of every range read, in bytes.
    pub payload_size: u64,
    /// Number of concurrent workers.
    pub thread_count: u64,
    /// Number of completed reads.
    pub sample_count: u64,
    /// Wall-clock time from first submission until the last sample arrived.
    pub elapsed: Duration,
    /// The raw samples in arrival order.
    pub samples: Vec<LatencySample>,
    /// Summary of first-byte latencies.
    pub first_byte: LatencyStats,
    /// Summary of last-byte latencies.
    pub last_byte: LatencyStats,
}

impl BenchmarkRun {
    /// Total number of payload bytes transferred in this run.
    pub fn total_bytes(&self) -> u64 {
        self.sample_count.saturating_mul(self.payload_size)
    }

    /// Transfer rate in binary megabytes per second.
    pub fn throughput_mib(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64().max(f64::MIN_POSITIVE);
        self.total_bytes() as f64 / seconds / MIB as f64
    }
}

/// Turns a run's raw samples into a [`BenchmarkRun`].
///
/// First-byte and last-byte latencies are sorted independently, so each dimension's percentiles
/// come from its own ordering.
pub fn aggregate(
    payload_size: u64,
    thread_count: u64,
    samples: Vec<LatencySample>,
    elapsed: Duration,
) -> BenchmarkRun {
    let mut first: Vec<_> = samples.iter().map(|s| s.first_byte).collect();
    let mut last: Vec<_> = samples.iter().map(|s| s.last_byte).collect();

    BenchmarkRun {
        payload_size,
        thread_count,
        sample_count: samples.len() as u64,
        elapsed,
        first_byte: LatencyStats::from_durations(&mut first),
        last_byte: LatencyStats::from_durations(&mut last),
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn sample(first: u64, last: u64) -> LatencySample {
        LatencySample {
            first_byte: ms(first),
            last_byte: ms(last),
        }
    }

    #[test]
    fn five_sample_scenario() {
        let samples = [30, 10, 50, 20, 40]
            .into_iter()
            .map(|v| sample(v, v * 2))
            .collect();
        let run = aggregate(MIB, 1, samples, Duration::from_secs(1));

        assert_eq!(run.first_byte.min, 10.0);
        assert_eq!(run.first_byte.max, 50.0);
        assert_eq!(run.first_byte.avg, 30.0);
        assert_eq!(percentile_index(5, 50), 1);
        assert_eq!(run.first_byte.p50, 20.0);
        assert_eq!(run.first_byte.p25, 10.0);
        assert_eq!(run.first_byte.p99, 40.0);
    }

    #[test]
    fn dimensions_are_sorted_independently() {
        // first-byte ascending order is the reverse of last-byte ascending order
        let samples = vec![sample(1, 400), sample(2, 300), sample(3, 200), sample(4, 100)];
        let run = aggregate(1, 1, samples, Duration::from_secs(1));

        assert_eq!(run.first_byte.min, 1.0);
        assert_eq!(run.first_byte.max, 4.0);
        assert_eq!(run.first_byte.p50, 2.0);
        assert_eq!(run.last_byte.min, 100.0);
        assert_eq!(run.last_byte.max, 400.0);
        assert_eq!(run.last_byte.p50, 200.0);
    }

    #[test]
    fn average_ignores_order() {
        let values = [17, 3, 99, 42, 8, 61, 5];
        let forward: Vec<_> = values.iter().map(|&v| sample(v, v)).collect();
        let mut backward = forward.clone();
        backward.reverse();

        let a = aggregate(1, 1, forward, Duration::from_secs(1));
        let b = aggregate(1, 1, backward, Duration::from_secs(1));
        let mean = values.iter().sum::<u64>() as f64 / values.len() as f64;

        assert!((a.first_byte.avg - mean).abs() < 1e-9);
        assert_eq!(a.first_byte, b.first_byte);
        assert_eq!(a.last_byte, b.last_byte);
    }

    #[test]
    fn percentile_indices_stay_in_bounds() {
        for n in 1..=500 {
            for percent in [25, 50, 75, 90, 99] {
                assert!(percentile_index(n, percent) < n, "n={n} p={percent}");
            }
        }
    }

    #[test]
    fn tiny_runs_collapse_percentiles() {
        let run = aggregate(1, 1, vec![sample(7, 9)], Duration::from_secs(1));
        for stat in Stat::REPORT_ORDER {
            assert_eq!(run.first_byte.get(stat), 7.0, "{stat}");
            assert_eq!(run.last_byte.get(stat), 9.0, "{stat}");
        }
    }

    #[test]
    fn percentile_indices_for_hundred_samples() {
        assert_eq!(percentile_index(100, 25), 24);
        assert_eq!(percentile_index(100, 50), 49);
        assert_eq!(percentile_index(100, 90), 89);
        assert_eq!(percentile_index(100, 99), 98);
    }

    #[test]
    fn sub_millisecond_precision() {
        let samples = vec![LatencySample {
            first_byte: Duration::from_micros(1500),
            last_byte: Duration::from_nanos(2_250_000),
        }];
        let run = aggregate(1, 1, samples, Duration::from_secs(1));
        assert_eq!(run.first_byte.p50, 1.5);
        assert_eq!(run.last_byte.avg, 2.25);
    }

    #[test]
    fn throughput_in_mib_per_second() {
        let samples = vec![sample(1, 1); 8];
        let run = aggregate(4 * MIB, 2, samples, Duration::from_secs(2));
        assert_eq!(run.total_bytes(), 32 * MIB);
        assert_eq!(run.throughput_mib(), 16.0);
    }
}
