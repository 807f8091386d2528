//! Wires the configured collaborators into a benchmark session.

use std::sync::Arc;

use anyhow::{Context, Result};
use rangebench_core::{SessionReport, SweepOrchestrator, Topology};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, OutputTarget};
use crate::monitor::SysinfoMonitor;
use crate::report::TableReporter;
use crate::s3::S3Storage;
use crate::sink::{CsvSink, SinkTarget};
use crate::topology::{Ec2Topology, METADATA_URL};

/// Runs a session on this host until it completes or the process is interrupted.
pub async fn run(config: Config, dry_run: bool) -> Result<()> {
    let topology =
        Ec2Topology::new(METADATA_URL).context("failed to create metadata client")?;

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_signal(cancel.clone()));
    let result = run_session(&config, &topology, dry_run, cancel).await;
    signals.abort();

    let report = result?;
    if report.interrupted {
        tracing::warn!(runs = report.runs, "session interrupted");
    }
    Ok(())
}

/// Runs a session on the host described by `topology`.
///
/// Cancelling `cancel` ends the session after discarding the run in progress. Rows of completed
/// runs are still flushed.
pub async fn run_session(
    config: &Config,
    topology: &dyn Topology,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<SessionReport> {
    let concurrency = topology.hardware_concurrency();
    let bench = config.bench_config(concurrency.threads, dry_run)?;

    let host = topology.host_info().await;
    let region = config.region(topology.region().await);
    tracing::info!(
        host_id = %host.host_id,
        instance_type = host.instance_type(),
        %region,
        cores = concurrency.cores,
        threads = concurrency.threads,
        "discovered host"
    );

    let storage = S3Storage::new(&config.storage, region)
        .context("failed to create storage client")?;
    let storage = Arc::new(storage);

    let target = match &config.output.target {
        OutputTarget::S3 => SinkTarget::S3 {
            storage: storage.clone(),
            bucket: config.storage.bucket.clone(),
        },
        OutputTarget::FileSystem { path } => SinkTarget::FileSystem { root: path.clone() },
    };
    let sink = CsvSink::new(target, host.instance_type())
        .with_results(config.output.results.clone())
        .with_stats(config.output.stats.clone());

    let reporter = TableReporter::stdout(config.throttling.enabled);

    let mut orchestrator = SweepOrchestrator::new(bench, host, storage, Box::new(sink))
        .with_observer(Box::new(reporter))
        .with_cancellation(cancel);
    if config.output.stats.is_some() && !dry_run {
        orchestrator = orchestrator.with_monitor(Box::new(SysinfoMonitor::new()));
    }

    orchestrator.run().await.context("benchmark session failed")
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate => {},
    }

    tracing::info!("received shutdown signal, finishing session");
    cancel.cancel();
}
