use thiserror::Error;

use crate::storage::StorageError;

/// Errors that abort a benchmark session.
///
/// None of these are retried. A run either collects its full sample set or the whole session
/// fails, so the variants only exist to give the top level a useful diagnostic.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The configuration was rejected before any request was issued.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A payload does not fit into the target object.
    #[error("payload of {payload} bytes does not fit into an object of {object} bytes")]
    RangeTooLarge {
        /// The requested payload size in bytes.
        payload: u64,
        /// The size of the target object in bytes.
        object: u64,
    },

    /// A request against the storage endpoint failed.
    #[error("storage error: {context}")]
    Storage {
        /// What the worker was doing when the request failed.
        context: String,
        #[source]
        cause: StorageError,
    },

    /// Flushing rows to the result sink failed.
    #[error("result sink error: {0}")]
    Sink(#[from] SinkError),

    /// All workers of a run exited before the run collected its samples.
    #[error("worker pool stopped after {received} of {expected} samples")]
    WorkersGone {
        /// Number of samples the run was waiting for.
        expected: u64,
        /// Number of samples received before the workers were gone.
        received: u64,
    },

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors reported by a [`ResultSink`](crate::sink::ResultSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// IO errors while writing rows.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure of the sink, such as a rejected upload.
    #[error("{context}")]
    Generic {
        /// Description of the failed operation.
        context: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for benchmark operations.
pub type Result<T, E = BenchError> = std::result::Result<T, E>;
