//! CSV result files, uploaded to the benchmark bucket or written to a local directory.
//!
//! Every flush produces one file per row kind. Summary rows go to `results/` and utilization
//! rows go to `stats/`, each named after the configured prefix and the instance type:
//!
//! - interval flush: `results/{prefix}-{run}-@{YYYY-mm-dd--HH-MM-SS}@-{instance}.csv`
//! - final flush: `results/{prefix}-{instance}.csv`
//!
//! A row kind without a configured prefix is not written at all.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rangebench_core::{FlushPoint, ObjectRef, ResultSink, SinkError, SummaryRow, UtilizationRow};
use serde::Serialize;

use crate::s3::S3Storage;

const RESULTS_DIR: &str = "results";
const STATS_DIR: &str = "stats";

/// Where a [`CsvSink`] puts its files.
#[derive(Debug)]
pub enum SinkTarget {
    /// Upload into a bucket.
    S3 {
        /// The client used for uploads.
        storage: Arc<S3Storage>,
        /// The bucket receiving the files.
        bucket: String,
    },
    /// Write below a local directory.
    FileSystem {
        /// The directory containing `results/` and `stats/`.
        root: PathBuf,
    },
}

/// A [`ResultSink`] writing CSV files.
#[derive(Debug)]
pub struct CsvSink {
    target: SinkTarget,
    results_prefix: Option<String>,
    stats_prefix: Option<String>,
    instance: String,
}

impl CsvSink {
    /// Creates a sink writing files labeled with the given instance type.
    pub fn new(target: SinkTarget, instance: impl Into<String>) -> Self {
        Self {
            target,
            results_prefix: None,
            stats_prefix: None,
            instance: instance.into(),
        }
    }

    /// Writes summary rows into files starting with `prefix`.
    pub fn with_results(mut self, prefix: Option<String>) -> Self {
        self.results_prefix = prefix;
        self
    }

    /// Writes utilization rows into files starting with `prefix`.
    pub fn with_stats(mut self, prefix: Option<String>) -> Self {
        self.stats_prefix = prefix;
        self
    }

    async fn write<R: Serialize>(
        &self,
        dir: &str,
        prefix: Option<&str>,
        point: FlushPoint,
        rows: &[R],
    ) -> Result<(), SinkError> {
        let Some(prefix) = prefix else {
            return Ok(());
        };

        let path = file_path(dir, prefix, &self.instance, point, Utc::now());
        let contents = encode_csv(rows)?;
        let size = contents.len();

        match &self.target {
            SinkTarget::S3 { storage, bucket } => {
                let object = ObjectRef {
                    bucket: bucket.clone(),
                    key: path.clone(),
                };
                storage
                    .put(&object, contents)
                    .await
                    .map_err(|cause| SinkError::Generic {
                        context: format!("failed to upload {object}"),
                        cause: Box::new(cause),
                    })?;
            }
            SinkTarget::FileSystem { root } => {
                let file = root.join(&path);
                if let Some(parent) = file.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&file, contents).await?;
            }
        }

        tracing::info!(%path, rows = rows.len(), size, "wrote result file");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResultSink for CsvSink {
    async fn write_results(&self, point: FlushPoint, rows: &[SummaryRow]) -> Result<(), SinkError> {
        self.write(RESULTS_DIR, self.results_prefix.as_deref(), point, rows)
            .await
    }

    async fn write_stats(
        &self,
        point: FlushPoint,
        rows: &[UtilizationRow],
    ) -> Result<(), SinkError> {
        self.write(STATS_DIR, self.stats_prefix.as_deref(), point, rows)
            .await
    }
}

fn file_path(
    dir: &str,
    prefix: &str,
    instance: &str,
    point: FlushPoint,
    now: DateTime<Utc>,
) -> String {
    match point {
        FlushPoint::Interval { run } => {
            let timestamp = now.format("%Y-%m-%d--%H-%M-%S");
            format!("{dir}/{prefix}-{run}-@{timestamp}@-{instance}.csv")
        }
        FlushPoint::Final => format!("{dir}/{prefix}-{instance}.csv"),
    }
}

/// Serializes rows with a header line derived from the row's field names.
fn encode_csv<R: Serialize>(rows: &[R]) -> Result<Bytes, SinkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).map_err(|cause| SinkError::Generic {
            context: "failed to encode row".into(),
            cause: Box::new(cause),
        })?;
    }

    let contents = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(Bytes::from(contents))
}
