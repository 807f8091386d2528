//! Adaptive sample counts per run.

/// Instance class fragments that mark a host as capable of sustaining large sample counts.
const HIGH_END_MARKERS: &[&str] = &["xlarge", "metal"];

/// Sample ceiling for hosts that are not classified as high-end.
const SMALL_HOST_SAMPLES: u64 = 50;

/// Graduated sample ceilings by thread count for high-end hosts.
const THREAD_BANDS: &[(u64, u64)] = &[(4, 100), (8, 250), (16, 500)];

/// Computes how many samples each run collects.
///
/// Small hosts get a flat, low ceiling to bound run time. On high-end hosts the ceiling grows
/// with concurrency, so that percentiles stay meaningful when many requests are in flight.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SampleSizer {
    requested: u64,
    cap: u64,
    high_end: bool,
}

impl SampleSizer {
    /// Creates a sizer for the requested sample count, hard cap, and instance class.
    pub fn new(requested: u64, cap: u64, instance_class: Option<&str>) -> Self {
        Self {
            requested,
            cap,
            high_end: instance_class.is_some_and(is_high_end),
        }
    }

    /// Returns `true` if the instance class was recognized as high-end.
    pub fn is_high_end(&self) -> bool {
        self.high_end
    }

    /// Returns the number of samples to collect for a run with `threads` workers.
    ///
    /// The result is always within `1..=cap` for a valid configuration.
    pub fn target(&self, threads: u64) -> u64 {
        let target = if !self.high_end {
            self.requested.min(SMALL_HOST_SAMPLES)
        } else {
            THREAD_BANDS
                .iter()
                .find(|(max_threads, _)| threads <= *max_threads)
                .map(|&(_, ceiling)| self.requested.min(ceiling))
                .unwrap_or_else(|| threads.saturating_mul(self.requested))
        };

        target.min(self.cap)
    }
}

fn is_high_end(instance_class: &str) -> bool {
    let instance_class = instance_class.to_ascii_lowercase();
    HIGH_END_MARKERS
        .iter()
        .any(|marker| instance_class.contains(marker))
}
