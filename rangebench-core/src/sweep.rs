//! Generators for the payload sizes and thread counts of a sweep.
//!
//! Both generators are plain iterators. They are lazy and finite, and once consumed they cannot
//! be restarted; the orchestrator creates a fresh [`ConcurrencySweep`] for every payload size.

use crate::error::{BenchError, Result};

/// One binary megabyte, the unit payload sizes are configured in.
pub const MIB: u64 = 1024 * 1024;

/// Bounds and stepping of the payload size sweep, in multiples of a unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PayloadSweep {
    /// Smallest payload, in units.
    pub min: u64,
    /// Largest payload, in units.
    pub max: u64,
    /// Multiplicative step between consecutive sizes. Must be greater than one.
    pub step: u64,
    /// Start at the largest size and divide down instead.
    pub reverse: bool,
}

impl PayloadSweep {
    /// Rejects bounds and steps that would produce an empty or endless sweep.
    pub fn validate(&self) -> Result<()> {
        if self.min == 0 {
            return Err(BenchError::Config("payload minimum must be at least 1".into()));
        }
        if self.min > self.max {
            return Err(BenchError::Config(format!(
                "payload minimum {} exceeds maximum {}",
                self.min, self.max
            )));
        }
        if self.step <= 1 {
            return Err(BenchError::Config(
                "payload size must increase in each step, the payload step must be > 1".into(),
            ));
        }
        Ok(())
    }

    /// Creates the generator for this sweep, scaling the bounds by `unit` bytes.
    pub fn sizes(&self, unit: u64) -> SizeSweep {
        let lower = self.min.saturating_mul(unit);
        let upper = self.max.saturating_mul(unit);
        SizeSweep {
            next: Some(if self.reverse { upper } else { lower }),
            lower,
            upper,
            step: self.step,
            reverse: self.reverse,
        }
    }
}

/// Geometric sequence of payload sizes in bytes.
///
/// Forward sweeps multiply by the step until the upper bound is exceeded, reverse sweeps divide
/// until they fall below the lower bound.
#[derive(Clone, Debug)]
pub struct SizeSweep {
    next: Option<u64>,
    lower: u64,
    upper: u64,
    step: u64,
    reverse: bool,
}

impl SizeSweep {
    fn in_bounds(&self, size: u64) -> bool {
        if self.reverse {
            size >= self.lower && size > 0
        } else {
            size <= self.upper
        }
    }
}

impl Iterator for SizeSweep {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let current = self.next.filter(|&size| self.in_bounds(size))?;
        self.next = if self.reverse {
            Some(current / self.step)
        } else {
            current.checked_mul(self.step)
        };
        Some(current)
    }
}

/// How the thread count grows between consecutive runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ThreadStep {
    /// Multiply the thread count by the factor and round.
    Multiply(f64),
    /// Add a fixed number of threads.
    Add(u64),
}

impl ThreadStep {
    /// Parses the signed step convention.
    ///
    /// Values greater than one are multiplicative factors, negative values are additive
    /// increments of their absolute value. Everything in `[0, 1]` is rejected, as is a negative
    /// increment that rounds to zero.
    pub fn from_signed(step: f64) -> Result<Self> {
        if step > 1.0 && step.is_finite() {
            return Ok(Self::Multiply(step));
        }

        if step < 0.0 && step.is_finite() {
            let increment = (-step).round();
            if increment >= 1.0 {
                return Ok(Self::Add(increment as u64));
            }
        }

        Err(BenchError::Config(format!(
            "invalid thread step {step}: use values > 1 to multiply or negative values to add"
        )))
    }

    /// Computes the thread count following `current`.
    ///
    /// The result is always strictly greater than `current`, so that small factors such as
    /// `1.2` still make progress from a single thread.
    pub fn apply(&self, current: u64) -> u64 {
        match *self {
            Self::Multiply(factor) => {
                let scaled = (current as f64 * factor).round() as u64;
                scaled.max(current.saturating_add(1))
            }
            Self::Add(increment) => current.saturating_add(increment),
        }
    }
}

/// Bounds and stepping of the thread count sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThreadSweep {
    /// Thread count of the first run for each payload size.
    pub min: u64,
    /// Largest thread count to run.
    pub max: u64,
    /// Growth between consecutive runs.
    pub step: ThreadStep,
}

impl ThreadSweep {
    /// Rejects bounds that would produce an empty sweep.
    pub fn validate(&self) -> Result<()> {
        if self.min == 0 {
            return Err(BenchError::Config("thread minimum must be at least 1".into()));
        }
        if self.min > self.max {
            return Err(BenchError::Config(format!(
                "thread minimum {} exceeds maximum {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Creates a fresh generator starting at the minimum thread count.
    pub fn counts(&self) -> ConcurrencySweep {
        ConcurrencySweep {
            next: Some(self.min),
            max: self.max,
            step: self.step,
        }
    }
}

/// Increasing sequence of thread counts, bounded by the configured maximum.
#[derive(Clone, Debug)]
pub struct ConcurrencySweep {
    next: Option<u64>,
    max: u64,
    step: ThreadStep,
}

impl Iterator for ConcurrencySweep {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let current = self.next.filter(|&threads| threads <= self.max)?;
        let following = self.step.apply(current);
        self.next = (following > current).then_some(following);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(min: u64, max: u64, step: u64, reverse: bool) -> PayloadSweep {
        PayloadSweep {
            min,
            max,
            step,
            reverse,
        }
    }

    #[test]
    fn forward_sizes_double() {
        let sizes: Vec<_> = payloads(1, 4, 2, false).sizes(MIB).collect();
        assert_eq!(sizes, [MIB, 2 * MIB, 4 * MIB]);
    }

    #[test]
    fn forward_sizes_stop_below_upper_bound() {
        let sizes: Vec<_> = payloads(10, 160, 3, false).sizes(1).collect();
        assert_eq!(sizes, [10, 30, 90]);
    }

    #[test]
    fn reverse_sizes_halve() {
        let sizes: Vec<_> = payloads(10, 160, 2, true).sizes(1).collect();
        assert_eq!(sizes, [160, 80, 40, 20, 10]);
    }

    #[test]
    fn reverse_sizes_stop_above_lower_bound() {
        let sizes: Vec<_> = payloads(3, 100, 4, true).sizes(1).collect();
        assert_eq!(sizes, [100, 25, 6]);
    }

    #[test]
    fn size_sweeps_are_strictly_monotonic() {
        for step in 2..6 {
            for (min, max) in [(1, 1), (1, 1000), (7, 300), (64, 64)] {
                let forward: Vec<_> = payloads(min, max, step, false).sizes(1).collect();
                assert_eq!(forward.first(), Some(&min));
                assert!(forward.windows(2).all(|w| w[0] < w[1]));
                assert!(forward.last().unwrap() * step > max);

                let reverse: Vec<_> = payloads(min, max, step, true).sizes(1).collect();
                assert_eq!(reverse.first(), Some(&max));
                assert!(reverse.windows(2).all(|w| w[0] > w[1]));
                assert!(reverse.last().unwrap() / step < min);
            }
        }
    }

    #[test]
    fn forward_sizes_terminate_on_overflow() {
        let sizes: Vec<_> = payloads(1, u64::MAX, 2, false).sizes(1).collect();
        assert_eq!(sizes.len(), 64);
    }

    #[test]
    fn payload_validation() {
        assert!(payloads(1, 4, 2, false).validate().is_ok());
        assert!(payloads(0, 4, 2, false).validate().is_err());
        assert!(payloads(8, 4, 2, false).validate().is_err());
        assert!(payloads(1, 4, 1, false).validate().is_err());
        assert!(payloads(1, 4, 0, false).validate().is_err());
    }

    #[test]
    fn signed_thread_step() {
        assert_eq!(ThreadStep::from_signed(2.0).unwrap(), ThreadStep::Multiply(2.0));
        assert_eq!(ThreadStep::from_signed(-4.0).unwrap(), ThreadStep::Add(4));
        assert_eq!(ThreadStep::from_signed(-1.4).unwrap(), ThreadStep::Add(1));

        for invalid in [0.0, 1.0, 0.5, -0.2, f64::NAN, f64::INFINITY] {
            assert!(ThreadStep::from_signed(invalid).is_err(), "{invalid}");
        }
    }

    #[test]
    fn geometric_thread_counts() {
        let sweep = ThreadSweep {
            min: 1,
            max: 4,
            step: ThreadStep::Multiply(2.0),
        };
        assert_eq!(sweep.counts().collect::<Vec<_>>(), [1, 2, 4]);
    }

    #[test]
    fn geometric_thread_counts_round() {
        let sweep = ThreadSweep {
            min: 3,
            max: 20,
            step: ThreadStep::Multiply(1.5),
        };
        // 3 * 1.5 = 4.5 rounds away from zero
        assert_eq!(sweep.counts().collect::<Vec<_>>(), [3, 5, 8, 12, 18]);
    }

    #[test]
    fn small_factors_still_progress() {
        let sweep = ThreadSweep {
            min: 1,
            max: 3,
            step: ThreadStep::Multiply(1.2),
        };
        assert_eq!(sweep.counts().collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn additive_thread_counts() {
        let sweep = ThreadSweep {
            min: 2,
            max: 11,
            step: ThreadStep::Add(3),
        };
        assert_eq!(sweep.counts().collect::<Vec<_>>(), [2, 5, 8, 11]);
    }

    #[test]
    fn thread_counts_are_restartable_per_size() {
        let sweep = ThreadSweep {
            min: 1,
            max: 2,
            step: ThreadStep::Add(1),
        };
        let mut counts = sweep.counts();
        assert_eq!(counts.by_ref().count(), 2);
        assert_eq!(counts.next(), None);
        assert_eq!(sweep.counts().count(), 2);
    }

    #[test]
    fn thread_validation() {
        let sweep = |min, max| ThreadSweep {
            min,
            max,
            step: ThreadStep::Add(1),
        };
        assert!(sweep(1, 1).validate().is_ok());
        assert!(sweep(0, 1).validate().is_err());
        assert!(sweep(4, 2).validate().is_err());
    }
}
