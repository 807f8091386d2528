//! Console tables of completed runs.

use std::io::{self, Write};

use bytesize::ByteSize;
use rangebench_core::{BenchmarkRun, LatencyStats, RunObserver, RunPlan, Stat};
use yansi::Paint;

const COLUMN_WIDTH: usize = 9;

/// Prints one table per payload size, with a row per completed run.
///
/// In throttling mode, rows are labeled by run number instead of thread count.
#[derive(Debug)]
pub struct TableReporter<W = io::Stdout> {
    out: W,
    throttling: bool,
}

impl TableReporter {
    /// Creates a reporter printing to stdout.
    pub fn stdout(throttling: bool) -> Self {
        Self::new(io::stdout(), throttling)
    }
}

impl<W: Write> TableReporter<W> {
    /// Creates a reporter printing to `out`.
    pub fn new(out: W, throttling: bool) -> Self {
        Self { out, throttling }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn print_header(&mut self) -> io::Result<()> {
        let label = if self.throttling { "#" } else { "Threads" };
        write!(self.out, "{:>8} {:>COLUMN_WIDTH$}", label.bold(), "MiB/s".bold())?;
        for prefix in ["FB", "LB"] {
            for stat in Stat::REPORT_ORDER {
                let title = format!("{prefix} {stat}");
                write!(self.out, " {:>COLUMN_WIDTH$}", title.bold())?;
            }
        }
        writeln!(self.out)
    }

    fn print_row(&mut self, plan: &RunPlan, run: &BenchmarkRun) -> io::Result<()> {
        let label = if self.throttling {
            plan.run_number
        } else {
            run.thread_count
        };

        write!(
            self.out,
            "{label:>8} {:>COLUMN_WIDTH$.2}",
            run.throughput_mib().green()
        )?;
        self.print_latencies(&run.first_byte)?;
        self.print_latencies(&run.last_byte)?;
        writeln!(self.out)
    }

    fn print_latencies(&mut self, stats: &LatencyStats) -> io::Result<()> {
        for stat in Stat::REPORT_ORDER {
            write!(self.out, " {:>COLUMN_WIDTH$.2}", stats.get(stat))?;
        }
        Ok(())
    }
}

impl<W: Write + Send> RunObserver for TableReporter<W> {
    fn payload_started(&mut self, payload_size: u64) {
        let result = writeln!(
            self.out,
            "\n{} {}",
            "## Payload".bold(),
            ByteSize::b(payload_size).bold().blue()
        )
        .and_then(|()| self.print_header());

        if let Err(error) = result {
            tracing::warn!(%error, "failed to print report");
        }
    }

    fn run_skipped(&mut self, plan: &RunPlan) {
        let result = writeln!(
            self.out,
            "{:>8} would read {} ranges of {} with {} threads",
            plan.run_number.dim(),
            plan.sample_count.bold(),
            ByteSize::b(plan.payload_size),
            plan.thread_count.bold(),
        );

        if let Err(error) = result {
            tracing::warn!(%error, "failed to print report");
        }
    }

    fn run_completed(&mut self, plan: &RunPlan, run: &BenchmarkRun) {
        if let Err(error) = self.print_row(plan, run) {
            tracing::warn!(%error, "failed to print report");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rangebench_core::stats::{self, LatencySample};

    use super::*;

    fn run(threads: u64) -> BenchmarkRun {
        let samples = [10, 20, 30, 40, 50]
            .into_iter()
            .map(|ms| LatencySample {
                first_byte: Duration::from_millis(ms),
                last_byte: Duration::from_millis(ms * 2),
            })
            .collect();
        stats::aggregate(1024 * 1024, threads, samples, Duration::from_secs(1))
    }

    fn plan(run_number: u64, threads: u64) -> RunPlan {
        RunPlan {
            run_number,
            payload_size: 1024 * 1024,
            thread_count: threads,
            sample_count: 5,
        }
    }

    fn render(reporter: TableReporter<Vec<u8>>) -> String {
        let bytes = reporter.into_inner();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn prints_table_per_payload() {
        yansi::disable();
        let mut reporter = TableReporter::new(Vec::new(), false);

        reporter.payload_started(1024 * 1024);
        reporter.run_completed(&plan(1, 4), &run(4));
        let output = render(reporter);
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(lines[1], "## Payload 1.0 MiB");
        assert!(lines[2].trim_start().starts_with("Threads"));
        assert!(lines[2].contains("FB p99"));
        assert!(lines[2].contains("LB max"));

        let row: Vec<_> = lines[3].split_whitespace().collect();
        // label, throughput, then eight first-byte and eight last-byte values
        assert_eq!(row.len(), 18);
        assert_eq!(row[0], "4");
        assert_eq!(row[1], "5.00");
        assert_eq!(row[2], "30.00");
        assert_eq!(row[10], "60.00");
    }

    #[test]
    fn labels_throttling_rows_by_run() {
        yansi::disable();
        let mut reporter = TableReporter::new(Vec::new(), true);

        reporter.payload_started(1024 * 1024);
        reporter.run_completed(&plan(7, 1), &run(1));
        let output = render(reporter);
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(lines[2].split_whitespace().next(), Some("#"));
        assert_eq!(lines[3].split_whitespace().next(), Some("7"));
    }

    #[test]
    fn describes_skipped_runs() {
        yansi::disable();
        let mut reporter = TableReporter::new(Vec::new(), false);

        reporter.run_skipped(&plan(3, 2));
        let output = render(reporter);

        assert_eq!(output.trim(), "3 would read 5 ranges of 1.0 MiB with 2 threads");
    }
}
