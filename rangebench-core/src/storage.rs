//! The storage capability the worker pool reads from.

use std::fmt;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::range::ByteRange;

/// The body of a range read, yielded chunk by chunk.
///
/// Dropping the stream closes the underlying response.
pub type RangeStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// A shared, type-erased [`ObjectStorage`] instance.
pub type SharedStorage = std::sync::Arc<dyn ObjectStorage>;

/// Address of the object that is being benchmarked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectRef {
    /// Name of the bucket holding the object.
    pub bucket: String,
    /// Key of the object within the bucket.
    pub key: String,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Read access to an object store.
///
/// Implementations are shared by every worker of every run and must not need external
/// synchronization.
#[async_trait::async_trait]
pub trait ObjectStorage: fmt::Debug + Send + Sync + 'static {
    /// Returns the size of the object in bytes.
    async fn head(&self, object: &ObjectRef) -> Result<u64, StorageError>;

    /// Starts a read of the given byte range.
    ///
    /// The returned future resolves once the response has started arriving, which is the point
    /// where first-byte latency is taken. The stream yields the body.
    async fn get_range(
        &self,
        object: &ObjectRef,
        range: ByteRange,
    ) -> Result<RangeStream, StorageError>;
}

/// Errors returned by [`ObjectStorage`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The endpoint answered with an unexpected status code.
    #[error("unexpected status {status}: {context}")]
    Status {
        /// The HTTP status code of the response.
        status: u16,
        /// Description of the failed operation.
        context: String,
    },

    /// The body ended before the requested number of bytes arrived.
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead {
        /// Number of bytes requested.
        expected: u64,
        /// Number of bytes received.
        received: u64,
    },

    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// IO errors related to payload streaming.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failures, such as connection resets or timeouts.
    #[error("request error: {context}")]
    Request {
        /// Description of the failed operation.
        context: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wraps a transport error with context.
    pub fn request<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Request {
            context: context.into(),
            cause: Box::new(cause),
        }
    }
}
