//! Buffering of result rows and flushing them to a [`ResultSink`].

use std::fmt;

use crate::error::{Result, SinkError};
use crate::record::{SummaryRow, UtilizationRow};

/// When a flush happens within the session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlushPoint {
    /// Periodic flush in throttling mode, after the given run number.
    Interval {
        /// Number of runs completed so far.
        run: u64,
    },
    /// The single flush at the end of the session.
    Final,
}

/// Destination for completed rows.
///
/// Any error is fatal to the session, since silently dropping measurements would defeat the
/// purpose of running the benchmark.
#[async_trait::async_trait]
pub trait ResultSink: fmt::Debug + Send + Sync {
    /// Persists a batch of summary rows.
    async fn write_results(&self, point: FlushPoint, rows: &[SummaryRow]) -> Result<(), SinkError>;

    /// Persists a batch of resource utilization rows.
    async fn write_stats(&self, point: FlushPoint, rows: &[UtilizationRow])
    -> Result<(), SinkError>;
}

/// Rows of completed runs that have not been flushed yet.
///
/// Only the orchestrator touches the buffer, and only between runs.
#[derive(Debug, Default)]
pub struct SessionBuffer {
    results: Vec<SummaryRow>,
    stats: Vec<UtilizationRow>,
}

impl SessionBuffer {
    /// Appends the summary of a completed run.
    pub fn push_result(&mut self, row: SummaryRow) {
        self.results.push(row);
    }

    /// Appends the utilization of a completed run.
    pub fn push_stats(&mut self, row: UtilizationRow) {
        self.stats.push(row);
    }

    /// Number of buffered summary rows.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if neither summary nor utilization rows are buffered.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.stats.is_empty()
    }

    /// Writes all buffered rows to the sink and clears the buffer.
    ///
    /// The buffer is only cleared once both batches were written. In a dry run, nothing is
    /// written and the flush is only logged.
    pub async fn flush(
        &mut self,
        sink: &dyn ResultSink,
        point: FlushPoint,
        dry_run: bool,
    ) -> Result<()> {
        if dry_run {
            tracing::info!(
                ?point,
                results = self.results.len(),
                stats = self.stats.len(),
                "would upload rows"
            );
        } else {
            sink.write_results(point, &self.results).await?;
            sink.write_stats(point, &self.stats).await?;
            tracing::info!(
                ?point,
                results = self.results.len(),
                stats = self.stats.len(),
                "flushed rows"
            );
        }

        self.results.clear();
        self.stats.clear();
        Ok(())
    }
}
