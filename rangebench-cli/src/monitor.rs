//! Host resource utilization through `sysinfo`.

use std::time::Instant;

use rangebench_core::{ResourceMonitor, ResourceSnapshot, ResourceUsage};
use sysinfo::{MemoryRefreshKind, System};

/// A [`ResourceMonitor`] sampling global CPU and memory usage.
///
/// `sysinfo` reports CPU usage relative to the previous refresh, so the CPU usage returned by
/// [`average_since`](ResourceMonitor::average_since) covers the whole interval since the snapshot.
#[derive(Debug)]
pub struct SysinfoMonitor {
    system: System,
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        Self { system }
    }

    fn refresh(&mut self) -> ResourceSnapshot {
        self.system.refresh_cpu_usage();
        self.system
            .refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());

        ResourceSnapshot {
            taken_at: Instant::now(),
            cpu_usage: self.system.global_cpu_usage(),
            memory_used: self.system.used_memory(),
            memory_total: self.system.total_memory(),
        }
    }
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor for SysinfoMonitor {
    fn snapshot(&mut self) -> ResourceSnapshot {
        self.refresh()
    }

    fn average_since(&mut self, reference: &ResourceSnapshot) -> ResourceUsage {
        let current = self.refresh();

        ResourceUsage {
            cpu_usage: current.cpu_usage,
            memory_used: reference.memory_used / 2 + current.memory_used / 2,
            memory_total: current.memory_total,
            interval: current.taken_at.duration_since(reference.taken_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn reports_usage_over_interval() {
        let mut monitor = SysinfoMonitor::new();
        let reference = monitor.snapshot();
        std::thread::sleep(Duration::from_millis(50));
        let usage = monitor.average_since(&reference);

        assert!(usage.interval >= Duration::from_millis(50));
        assert!(usage.memory_total > 0);
        assert!(usage.memory_used <= usage.memory_total);
        assert!((0.0..=100.0).contains(&usage.cpu_usage));
    }
}
