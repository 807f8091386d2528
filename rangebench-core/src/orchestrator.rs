//! Drives a whole benchmark session.
//!
//! In sweep mode, the orchestrator runs every combination of payload size and thread count once,
//! with payload sizes in the outer loop. In throttling mode it repeats a single combination until
//! the session is cancelled, flushing buffered rows every few runs so that memory stays bounded
//! and earlier results survive a later failure.
//!
//! Runs execute strictly one after another. Any error ends the session immediately; buffered
//! rows are only flushed when the session ends normally or is cancelled.

use tokio_util::sync::CancellationToken;

use crate::config::{BenchConfig, Mode};
use crate::error::{BenchError, Result};
use crate::monitor::ResourceMonitor;
use crate::observer::{NoopObserver, RunObserver, RunPlan};
use crate::pool::RequestWorkerPool;
use crate::record::{HostInfo, SummaryRow, UtilizationRow};
use crate::sampling::SampleSizer;
use crate::sink::{FlushPoint, ResultSink, SessionBuffer};
use crate::stats;
use crate::storage::SharedStorage;

/// What happened during a session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionReport {
    /// Number of runs that completed, or were planned in a dry run.
    pub runs: u64,
    /// Number of flushes, including the final one.
    pub flushes: u64,
    /// Whether the session ended because it was cancelled.
    pub interrupted: bool,
}

/// Runs a benchmark session against one object.
pub struct SweepOrchestrator {
    config: BenchConfig,
    host: HostInfo,
    storage: SharedStorage,
    sink: Box<dyn ResultSink>,
    monitor: Option<Box<dyn ResourceMonitor>>,
    observer: Box<dyn RunObserver>,
    cancel: CancellationToken,
    buffer: SessionBuffer,
    report: SessionReport,
}

impl std::fmt::Debug for SweepOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepOrchestrator")
            .field("config", &self.config)
            .field("host", &self.host)
            .field("storage", &self.storage)
            .field("sink", &self.sink)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl SweepOrchestrator {
    /// Creates an orchestrator for the given session.
    pub fn new(
        config: BenchConfig,
        host: HostInfo,
        storage: SharedStorage,
        sink: Box<dyn ResultSink>,
    ) -> Self {
        Self {
            config,
            host,
            storage,
            sink,
            monitor: None,
            observer: Box::new(NoopObserver),
            cancel: CancellationToken::new(),
            buffer: SessionBuffer::default(),
            report: SessionReport::default(),
        }
    }

    /// Samples resource utilization around every run.
    pub fn with_monitor(mut self, monitor: Box<dyn ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Reports progress to the given observer.
    pub fn with_observer(mut self, observer: Box<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Ends the session once the token is cancelled.
    ///
    /// A run in progress at that time is discarded. Rows of completed runs are still flushed.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the session to completion.
    ///
    /// Validates the configuration, resolves the object size, and then runs the sweep or the
    /// throttling loop. Returns the first error encountered without flushing.
    pub async fn run(mut self) -> Result<SessionReport> {
        self.config.validate()?;

        let object = self.config.object.clone();
        let object_size =
            self.storage
                .head(&object)
                .await
                .map_err(|cause| BenchError::Storage {
                    context: format!("failed to get the size of {object}"),
                    cause,
                })?;
        tracing::info!(%object, object_size, "resolved benchmark object");

        let largest = self
            .config
            .payloads
            .sizes(self.config.payload_unit)
            .max()
            .unwrap_or_default();
        if largest > object_size {
            return Err(BenchError::RangeTooLarge {
                payload: largest,
                object: object_size,
            });
        }

        let pool = RequestWorkerPool::new(self.storage.clone(), object, object_size);
        let sizer = SampleSizer::new(
            self.config.samples,
            self.config.sample_cap,
            self.host.instance_class.as_deref(),
        );
        tracing::debug!(high_end = sizer.is_high_end(), "sizing samples");

        match self.config.mode {
            Mode::Sweep => self.sweep(&pool, &sizer).await?,
            Mode::Throttling { flush_interval } => {
                self.throttle(&pool, &sizer, flush_interval).await?
            }
        }

        // a dry run always reports the final flush it would perform
        if !self.buffer.is_empty() || self.config.dry_run {
            self.flush(FlushPoint::Final).await?;
        }

        tracing::info!(
            runs = self.report.runs,
            flushes = self.report.flushes,
            interrupted = self.report.interrupted,
            "session finished"
        );
        Ok(self.report)
    }

    async fn sweep(&mut self, pool: &RequestWorkerPool, sizer: &SampleSizer) -> Result<()> {
        let payloads = self.config.payloads;
        let threads = self.config.threads;
        let cancel = self.cancel.clone();

        for payload_size in payloads.sizes(self.config.payload_unit) {
            self.observer.payload_started(payload_size);

            for thread_count in threads.counts() {
                let plan = RunPlan {
                    run_number: self.report.runs + 1,
                    payload_size,
                    thread_count,
                    sample_count: sizer.target(thread_count),
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.report.interrupted = true;
                        return Ok(());
                    }
                    result = self.execute(pool, plan) => result?,
                }
            }

            self.observer.payload_finished(payload_size);
        }

        Ok(())
    }

    async fn throttle(
        &mut self,
        pool: &RequestWorkerPool,
        sizer: &SampleSizer,
        flush_interval: u64,
    ) -> Result<()> {
        let payload_size = self.config.payloads.sizes(self.config.payload_unit).next();
        let thread_count = self.config.threads.counts().next();
        let (Some(payload_size), Some(thread_count)) = (payload_size, thread_count) else {
            return Err(BenchError::Config(
                "throttling mode needs a payload size and thread count".into(),
            ));
        };

        let cancel = self.cancel.clone();
        self.observer.payload_started(payload_size);

        for run_number in 1.. {
            let plan = RunPlan {
                run_number,
                payload_size,
                thread_count,
                sample_count: sizer.target(thread_count),
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.report.interrupted = true;
                    break;
                }
                result = self.execute(pool, plan) => result?,
            }

            if run_number % flush_interval == 0 {
                self.flush(FlushPoint::Interval { run: run_number }).await?;

                // a dry run plans a single flush interval
                if self.config.dry_run {
                    break;
                }
            }
        }

        self.observer.payload_finished(payload_size);
        Ok(())
    }

    /// Executes one run and buffers its rows.
    async fn execute(&mut self, pool: &RequestWorkerPool, plan: RunPlan) -> Result<()> {
        tracing::debug!(?plan, "starting run");

        if self.config.dry_run {
            self.report.runs += 1;
            self.observer.run_skipped(&plan);
            return Ok(());
        }

        let reference = self.monitor.as_mut().map(|monitor| monitor.snapshot());
        let outcome = pool
            .execute(plan.payload_size, plan.thread_count, plan.sample_count)
            .await?;
        let usage = match (self.monitor.as_mut(), reference) {
            (Some(monitor), Some(reference)) => Some(monitor.average_since(&reference)),
            _ => None,
        };

        let run = stats::aggregate(
            plan.payload_size,
            plan.thread_count,
            outcome.samples,
            outcome.elapsed,
        );
        tracing::info!(
            run = plan.run_number,
            payload_size = plan.payload_size,
            threads = plan.thread_count,
            samples = run.sample_count,
            throughput = run.throughput_mib(),
            "run completed"
        );

        self.buffer.push_result(SummaryRow::new(&self.host, &run));
        if let Some(usage) = usage {
            self.buffer.push_stats(UtilizationRow::new(
                &self.host,
                plan.payload_size,
                plan.thread_count,
                &usage,
            ));
        }

        self.report.runs += 1;
        self.observer.run_completed(&plan, &run);
        Ok(())
    }

    async fn flush(&mut self, point: FlushPoint) -> Result<()> {
        self.buffer
            .flush(self.sink.as_ref(), point, self.config.dry_run)
            .await?;
        self.report.flushes += 1;
        Ok(())
    }
}
