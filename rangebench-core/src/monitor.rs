//! The optional resource monitor sampled around every run.

use std::fmt;
use std::time::{Duration, Instant};

/// Point-in-time resource utilization of the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResourceSnapshot {
    /// When the snapshot was taken.
    pub taken_at: Instant,
    /// Global CPU usage in percent.
    pub cpu_usage: f32,
    /// Used memory in bytes.
    pub memory_used: u64,
    /// Total memory in bytes.
    pub memory_total: u64,
}

/// Resource utilization averaged over an interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResourceUsage {
    /// Average CPU usage in percent.
    pub cpu_usage: f32,
    /// Average used memory in bytes.
    pub memory_used: u64,
    /// Total memory in bytes.
    pub memory_total: u64,
    /// Length of the interval.
    pub interval: Duration,
}

/// Samples host resource utilization.
///
/// The orchestrator takes a [`snapshot`](Self::snapshot) when a run starts and asks for the
/// [`average_since`](Self::average_since) that snapshot when it ends.
pub trait ResourceMonitor: fmt::Debug + Send {
    /// Takes a point-in-time snapshot.
    fn snapshot(&mut self) -> ResourceSnapshot;

    /// Returns the average utilization between `reference` and now.
    fn average_since(&mut self, reference: &ResourceSnapshot) -> ResourceUsage;
}
