//! Output rows produced for every completed run.

use serde::Serialize;

use crate::monitor::ResourceUsage;
use crate::stats::{BenchmarkRun, LatencyStats};

/// Instance type reported when the host could not be classified.
pub const UNKNOWN_INSTANCE: &str = "unknown-instance";

/// Identity of the host running the benchmark.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostInfo {
    /// Host name or cloud instance id.
    pub host_id: String,
    /// Coarse hardware tier, such as a cloud instance type.
    pub instance_class: Option<String>,
}

impl HostInfo {
    /// Instance type as written into result rows.
    pub fn instance_type(&self) -> &str {
        self.instance_class.as_deref().unwrap_or(UNKNOWN_INSTANCE)
    }
}

/// One result row, summarizing a single run.
///
/// Field order is the column order of the written results.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryRow {
    pub host_id: String,
    pub instance_type: String,
    pub payload_size: u64,
    pub thread_count: u64,
    /// Throughput in MiB/s.
    pub throughput: f64,
    pub first_byte_avg: f64,
    pub first_byte_min: f64,
    pub first_byte_p25: f64,
    pub first_byte_p50: f64,
    pub first_byte_p75: f64,
    pub first_byte_p90: f64,
    pub first_byte_p99: f64,
    pub first_byte_max: f64,
    pub last_byte_avg: f64,
    pub last_byte_min: f64,
    pub last_byte_p25: f64,
    pub last_byte_p50: f64,
    pub last_byte_p75: f64,
    pub last_byte_p90: f64,
    pub last_byte_p99: f64,
    pub last_byte_max: f64,
    pub sample_count: u64,
}

impl SummaryRow {
    /// Builds the row for a completed run.
    pub fn new(host: &HostInfo, run: &BenchmarkRun) -> Self {
        let LatencyStats {
            min: fb_min,
            max: fb_max,
            avg: fb_avg,
            p25: fb_p25,
            p50: fb_p50,
            p75: fb_p75,
            p90: fb_p90,
            p99: fb_p99,
        } = run.first_byte;
        let LatencyStats {
            min: lb_min,
            max: lb_max,
            avg: lb_avg,
            p25: lb_p25,
            p50: lb_p50,
            p75: lb_p75,
            p90: lb_p90,
            p99: lb_p99,
        } = run.last_byte;

        Self {
            host_id: host.host_id.clone(),
            instance_type: host.instance_type().to_owned(),
            payload_size: run.payload_size,
            thread_count: run.thread_count,
            throughput: run.throughput_mib(),
            first_byte_avg: fb_avg,
            first_byte_min: fb_min,
            first_byte_p25: fb_p25,
            first_byte_p50: fb_p50,
            first_byte_p75: fb_p75,
            first_byte_p90: fb_p90,
            first_byte_p99: fb_p99,
            first_byte_max: fb_max,
            last_byte_avg: lb_avg,
            last_byte_min: lb_min,
            last_byte_p25: lb_p25,
            last_byte_p50: lb_p50,
            last_byte_p75: lb_p75,
            last_byte_p90: lb_p90,
            last_byte_p99: lb_p99,
            last_byte_max: lb_max,
            sample_count: run.sample_count,
        }
    }
}

/// One resource utilization row, keyed like the [`SummaryRow`] of the same run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UtilizationRow {
    pub host_id: String,
    pub instance_type: String,
    pub payload_size: u64,
    pub thread_count: u64,
    /// Average CPU usage over the run, in percent.
    pub cpu_usage: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    /// Length of the sampled interval in milliseconds.
    pub interval_ms: u64,
}

impl UtilizationRow {
    /// Builds the row for a run's resource usage.
    pub fn new(
        host: &HostInfo,
        payload_size: u64,
        thread_count: u64,
        usage: &ResourceUsage,
    ) -> Self {
        Self {
            host_id: host.host_id.clone(),
            instance_type: host.instance_type().to_owned(),
            payload_size,
            thread_count,
            cpu_usage: usage.cpu_usage,
            memory_used: usage.memory_used,
            memory_total: usage.memory_total,
            interval_ms: usage.interval.as_millis() as u64,
        }
    }
}
