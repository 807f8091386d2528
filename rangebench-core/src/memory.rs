//! In-memory storage for tests.
//!
//! This provides an [`ObjectStorage`] backed by a `HashMap`, with knobs to simulate latency,
//! failing requests, and truncated bodies. The storage is [`Clone`] so tests can hold a handle
//! for inspecting request counters while the worker pool owns a shared copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::range::ByteRange;
use crate::storage::{ObjectRef, ObjectStorage, RangeStream, StorageError};

/// Request counters of an [`InMemoryStorage`].
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of `head` calls.
    pub heads: AtomicU64,
    /// Number of `get_range` calls, including failed ones.
    pub range_reads: AtomicU64,
    /// Number of body bytes handed out.
    pub bytes_served: AtomicU64,
}

/// An [`ObjectStorage`] serving objects from memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStorage {
    objects: Arc<Mutex<HashMap<(String, String), Bytes>>>,
    stats: Arc<StorageStats>,
    first_byte_latency: Duration,
    body_latency: Duration,
    fail_after: Option<u64>,
    truncate_by: u64,
}

impl InMemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object of `size` random bytes under the given reference.
    pub fn with_random_object(self, object: &ObjectRef, size: usize) -> Self {
        let mut contents = vec![0; size];
        SmallRng::seed_from_u64(size as u64).fill_bytes(&mut contents);
        self.objects.lock().unwrap().insert(
            (object.bucket.clone(), object.key.clone()),
            Bytes::from(contents),
        );
        self
    }

    /// Delays every response by `first_byte`, and every body by a further `body`.
    pub fn with_latency(mut self, first_byte: Duration, body: Duration) -> Self {
        self.first_byte_latency = first_byte;
        self.body_latency = body;
        self
    }

    /// Lets the first `reads` range reads succeed and fails every one after.
    pub fn fail_after(mut self, reads: u64) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Cuts `bytes` off the end of every body.
    pub fn truncate_bodies(mut self, bytes: u64) -> Self {
        self.truncate_by = bytes;
        self
    }

    /// Returns the request counters shared by all clones of this storage.
    pub fn stats(&self) -> Arc<StorageStats> {
        Arc::clone(&self.stats)
    }

    /// Returns the size of a stored object.
    pub fn object_size(&self, object: &ObjectRef) -> Option<u64> {
        self.lookup(object).map(|bytes| bytes.len() as u64)
    }

    fn lookup(&self, object: &ObjectRef) -> Option<Bytes> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(&(object.bucket.clone(), object.key.clone()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn head(&self, object: &ObjectRef) -> Result<u64, StorageError> {
        self.stats.heads.fetch_add(1, Ordering::Relaxed);
        self.object_size(object)
            .ok_or_else(|| StorageError::NotFound(object.to_string()))
    }

    async fn get_range(
        &self,
        object: &ObjectRef,
        range: ByteRange,
    ) -> Result<RangeStream, StorageError> {
        let attempt = self.stats.range_reads.fetch_add(1, Ordering::Relaxed);
        if self.fail_after.is_some_and(|limit| attempt >= limit) {
            return Err(StorageError::Status {
                status: 503,
                context: format!("injected failure for {object}"),
            });
        }

        let bytes = self
            .lookup(object)
            .ok_or_else(|| StorageError::NotFound(object.to_string()))?;
        if range.end > bytes.len() as u64 {
            return Err(StorageError::Status {
                status: 416,
                context: format!("range {range} outside of {object}"),
            });
        }

        if !self.first_byte_latency.is_zero() {
            tokio::time::sleep(self.first_byte_latency).await;
        }

        let end = range.end.saturating_sub(self.truncate_by).max(range.start);
        let body = bytes.slice(range.start as usize..end as usize);
        self.stats
            .bytes_served
            .fetch_add(body.len() as u64, Ordering::Relaxed);

        let body_latency = self.body_latency;
        let stream = futures_util::stream::once(async move {
            if !body_latency.is_zero() {
                tokio::time::sleep(body_latency).await;
            }
            Ok(body)
        });

        Ok(stream.boxed())
    }
}
