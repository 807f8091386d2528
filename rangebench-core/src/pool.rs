//! Concurrent execution of the timed range reads of one run.
//!
//! A run is driven by a single coordinator. It spawns one worker task per thread, feeds a bounded
//! task queue with exactly one token per sample, and collects latencies from a result channel
//! until every sample has arrived. The queue has one slot per worker, so submission is throttled
//! by how fast the workers pick up work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::error::{BenchError, Result};
use crate::range::ByteRange;
use crate::stats::LatencySample;
use crate::storage::{ObjectRef, SharedStorage, StorageError};

/// Raw output of a run, before aggregation.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// One sample per completed read, in arrival order.
    pub samples: Vec<LatencySample>,
    /// Wall-clock time from the first submission until the last sample arrived.
    pub elapsed: Duration,
}

/// Executes runs of randomized range reads against one object.
#[derive(Clone, Debug)]
pub struct RequestWorkerPool {
    storage: SharedStorage,
    object: Arc<ObjectRef>,
    object_size: u64,
}

impl RequestWorkerPool {
    /// Creates a pool reading from `object`, which is `object_size` bytes large.
    pub fn new(storage: SharedStorage, object: ObjectRef, object_size: u64) -> Self {
        Self {
            storage,
            object: Arc::new(object),
            object_size,
        }
    }

    /// Performs exactly `sample_count` reads of `payload_size` bytes using `thread_count`
    /// concurrent workers.
    ///
    /// The first failed read aborts the run. Outstanding workers are cancelled and the error is
    /// returned without any partial result.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn execute(
        &self,
        payload_size: u64,
        thread_count: u64,
        sample_count: u64,
    ) -> Result<RunOutcome> {
        if payload_size > self.object_size {
            return Err(BenchError::RangeTooLarge {
                payload: payload_size,
                object: self.object_size,
            });
        }

        let queue_capacity = thread_count.max(1) as usize;
        let (task_tx, task_rx) = mpsc::channel::<u64>(queue_capacity);
        let (result_tx, mut result_rx) = mpsc::channel(sample_count.max(1) as usize);
        let task_rx = Arc::new(Mutex::new(task_rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..thread_count {
            workers.spawn(worker_loop(
                worker_id,
                self.clone(),
                payload_size,
                Arc::clone(&task_rx),
                result_tx.clone(),
            ));
        }
        // Workers hold the only remaining senders, so the channel closes once they are all gone.
        drop(result_tx);
        drop(task_rx);

        let start = Instant::now();

        let submit = async move {
            for token in 0..sample_count {
                if task_tx.send(token).await.is_err() {
                    // All workers exited, the collector reports the shortfall.
                    break;
                }
            }
            // Dropping the sender closes the queue to further submission.
            Ok::<_, BenchError>(())
        };

        let collect = async {
            let mut samples = Vec::with_capacity(sample_count as usize);
            while (samples.len() as u64) < sample_count {
                match result_rx.recv().await {
                    Some(Ok(sample)) => samples.push(sample),
                    Some(Err(err)) => return Err(err),
                    None => {
                        return Err(BenchError::WorkersGone {
                            expected: sample_count,
                            received: samples.len() as u64,
                        });
                    }
                }
            }
            Ok(samples)
        };

        let result = tokio::try_join!(submit, collect);
        let elapsed = start.elapsed();

        let samples = match result {
            Ok(((), samples)) => samples,
            Err(err) => {
                // Surface a panicking worker instead of the generic shortfall.
                if matches!(err, BenchError::WorkersGone { .. }) {
                    while let Some(joined) = workers.join_next().await {
                        joined?;
                    }
                }
                return Err(err);
            }
        };

        while let Some(joined) = workers.join_next().await {
            joined?;
        }

        Ok(RunOutcome { samples, elapsed })
    }
}

async fn worker_loop(
    worker_id: u64,
    pool: RequestWorkerPool,
    payload_size: u64,
    tasks: Arc<Mutex<mpsc::Receiver<u64>>>,
    results: mpsc::Sender<Result<LatencySample>>,
) {
    let mut rng = SmallRng::seed_from_u64(rand::random());

    loop {
        let token = tasks.lock().await.recv().await;
        let Some(token) = token else {
            break;
        };

        let sample = match ByteRange::random(&mut rng, pool.object_size, payload_size) {
            Ok(range) => timed_read(&pool, range).await.map_err(|cause| {
                BenchError::Storage {
                    context: format!("worker {worker_id} failed reading {range} (task {token})"),
                    cause,
                }
            }),
            Err(err) => Err(err),
        };

        let failed = sample.is_err();
        if results.send(sample).await.is_err() || failed {
            break;
        }
    }

    tracing::trace!(worker_id, "worker finished");
}

/// Issues one range read and measures first-byte and last-byte latency.
async fn timed_read(
    pool: &RequestWorkerPool,
    range: ByteRange,
) -> Result<LatencySample, StorageError> {
    let start = Instant::now();

    let mut stream = pool.storage.get_range(&pool.object, range).await?;
    let first_byte = start.elapsed();

    let mut received = 0;
    while let Some(chunk) = stream.next().await {
        received += chunk?.len() as u64;
    }
    drop(stream);
    let last_byte = start.elapsed();

    if received != range.len() {
        return Err(StorageError::ShortRead {
            expected: range.len(),
            received,
        });
    }

    Ok(LatencySample {
        first_byte,
        last_byte,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::memory::InMemoryStorage;

    fn object() -> ObjectRef {
        ObjectRef {
            bucket: "bucket".into(),
            key: "object".into(),
        }
    }

    fn pool(storage: &InMemoryStorage) -> RequestWorkerPool {
        let size = storage.object_size(&object()).unwrap();
        RequestWorkerPool::new(Arc::new(storage.clone()), object(), size)
    }

    #[tokio::test]
    async fn collects_exactly_the_sample_count() {
        for (threads, samples) in [(1, 1), (1, 10), (4, 10), (10, 4), (16, 1), (3, 3)] {
            let storage = InMemoryStorage::new().with_random_object(&object(), 4096);
            let outcome = pool(&storage).execute(128, threads, samples).await.unwrap();

            assert_eq!(outcome.samples.len() as u64, samples, "T={threads} S={samples}");
            assert_eq!(
                storage.stats().range_reads.load(Ordering::Relaxed),
                samples,
                "T={threads} S={samples}"
            );
        }
    }

    #[tokio::test]
    async fn reads_requested_ranges() {
        let storage = InMemoryStorage::new().with_random_object(&object(), 1000);
        pool(&storage).execute(1000, 2, 6).await.unwrap();

        let stats = storage.stats();
        assert_eq!(stats.bytes_served.load(Ordering::Relaxed), 6000);
    }

    #[tokio::test]
    async fn last_byte_follows_first_byte() {
        let storage = InMemoryStorage::new()
            .with_random_object(&object(), 1 << 16)
            .with_latency(Duration::from_millis(2), Duration::from_millis(3));
        let outcome = pool(&storage).execute(1024, 2, 4).await.unwrap();

        for sample in &outcome.samples {
            assert!(sample.first_byte >= Duration::from_millis(2));
            assert!(sample.last_byte >= sample.first_byte + Duration::from_millis(3));
        }
        assert!(outcome.elapsed >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn failed_read_aborts_the_run() {
        let storage = InMemoryStorage::new()
            .with_random_object(&object(), 4096)
            .fail_after(3);
        let err = pool(&storage).execute(64, 2, 20).await.unwrap_err();

        assert!(matches!(err, BenchError::Storage { .. }), "{err:?}");
        assert!(storage.stats().range_reads.load(Ordering::Relaxed) < 20);
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let storage = InMemoryStorage::new()
            .with_random_object(&object(), 4096)
            .truncate_bodies(1);
        let err = pool(&storage).execute(64, 1, 1).await.unwrap_err();

        let BenchError::Storage { cause, .. } = err else {
            panic!("expected storage error, got {err:?}");
        };
        assert!(matches!(
            cause,
            StorageError::ShortRead {
                expected: 64,
                received: 63
            }
        ));
    }

    #[tokio::test]
    async fn oversized_payload_fails_before_reading() {
        let storage = InMemoryStorage::new().with_random_object(&object(), 100);
        let err = pool(&storage).execute(101, 1, 1).await.unwrap_err();

        assert!(matches!(err, BenchError::RangeTooLarge { .. }));
        assert_eq!(storage.stats().range_reads.load(Ordering::Relaxed), 0);
    }
}
