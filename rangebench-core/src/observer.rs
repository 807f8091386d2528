//! Progress callbacks of the orchestrator.

use crate::stats::BenchmarkRun;

/// Parameters of a single run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunPlan {
    /// One-based position of the run within the session.
    pub run_number: u64,
    /// Size of every range read, in bytes.
    pub payload_size: u64,
    /// Number of concurrent workers.
    pub thread_count: u64,
    /// Number of reads to perform.
    pub sample_count: u64,
}

/// Receives progress of a session, for example to render a report.
///
/// All methods default to doing nothing.
pub trait RunObserver: Send {
    /// A new payload size is about to be swept.
    fn payload_started(&mut self, _payload_size: u64) {}

    /// A run was planned but skipped because of a dry run.
    fn run_skipped(&mut self, _plan: &RunPlan) {}

    /// A run completed and was added to the session buffer.
    fn run_completed(&mut self, _plan: &RunPlan, _run: &BenchmarkRun) {}

    /// All runs of a payload size have completed.
    fn payload_finished(&mut self, _payload_size: u64) {}
}

/// An observer that ignores all progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
