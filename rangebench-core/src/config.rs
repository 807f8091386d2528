//! The immutable configuration of a benchmark session.

use crate::error::{BenchError, Result};
use crate::storage::ObjectRef;
use crate::sweep::{MIB, PayloadSweep, ThreadSweep};

/// How the orchestrator walks the configured sweep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Run every combination of payload size and thread count exactly once.
    Sweep,
    /// Repeat the first payload size and thread count until interrupted.
    Throttling {
        /// Flush buffered rows after every this many runs.
        flush_interval: u64,
    },
}

/// Everything the engine needs to run a session.
///
/// Built once at startup and never modified afterwards.
#[derive(Clone, Debug)]
pub struct BenchConfig {
    /// The object that range reads are issued against.
    pub object: ObjectRef,
    /// Payload size sweep, in multiples of `payload_unit`.
    pub payloads: PayloadSweep,
    /// Size of one payload unit in bytes.
    pub payload_unit: u64,
    /// Thread count sweep.
    pub threads: ThreadSweep,
    /// Requested number of samples per run, before adaptive sizing.
    pub samples: u64,
    /// Upper bound for samples per run.
    pub sample_cap: u64,
    /// Sweep or throttling mode.
    pub mode: Mode,
    /// Walk the sweep without issuing reads or writing results.
    pub dry_run: bool,
}

impl BenchConfig {
    /// Creates a sweep configuration with the remaining settings at their defaults.
    pub fn new(object: ObjectRef, payloads: PayloadSweep, threads: ThreadSweep) -> Self {
        Self {
            object,
            payloads,
            payload_unit: MIB,
            threads,
            samples: 100,
            sample_cap: 7200,
            mode: Mode::Sweep,
            dry_run: false,
        }
    }

    /// Checks all settings before any request is issued.
    pub fn validate(&self) -> Result<()> {
        self.payloads.validate()?;
        self.threads.validate()?;

        if self.payload_unit == 0 {
            return Err(BenchError::Config("payload unit must be at least 1 byte".into()));
        }
        if self.samples == 0 {
            return Err(BenchError::Config("sample count must be at least 1".into()));
        }
        if self.sample_cap == 0 {
            return Err(BenchError::Config("sample cap must be at least 1".into()));
        }
        if let Mode::Throttling { flush_interval: 0 } = self.mode {
            return Err(BenchError::Config(
                "throttling flush interval must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::ThreadStep;

    fn config() -> BenchConfig {
        BenchConfig::new(
            ObjectRef {
                bucket: "b".into(),
                key: "k".into(),
            },
            PayloadSweep {
                min: 1,
                max: 4,
                step: 2,
                reverse: false,
            },
            ThreadSweep {
                min: 1,
                max: 4,
                step: ThreadStep::Multiply(2.0),
            },
        )
    }

    #[test]
    fn defaults_are_valid() {
        config().validate().unwrap();
    }

    #[test]
    fn rejects_invalid_settings() {
        let mut zero_samples = config();
        zero_samples.samples = 0;
        assert!(zero_samples.validate().is_err());

        let mut zero_cap = config();
        zero_cap.sample_cap = 0;
        assert!(zero_cap.validate().is_err());

        let mut zero_interval = config();
        zero_interval.mode = Mode::Throttling { flush_interval: 0 };
        assert!(zero_interval.validate().is_err());

        let mut inverted = config();
        inverted.threads.min = 8;
        assert!(matches!(inverted.validate(), Err(BenchError::Config(_))));
    }
}
