//! The benchmark engine for randomized range reads against object storage.
//!
//! A session is described by a [`BenchConfig`] and executed by a [`SweepOrchestrator`]. The
//! orchestrator walks a sweep of payload sizes and thread counts, and for every combination asks
//! the [`RequestWorkerPool`] to perform a run: a fixed number of timed range reads issued by a
//! fixed number of concurrent workers. The latencies of a run are aggregated into a
//! [`BenchmarkRun`], turned into a [`SummaryRow`], and buffered until they are flushed to a
//! [`ResultSink`].
//!
//! Storage access goes through the [`ObjectStorage`] trait, so the engine is independent of the
//! actual provider. [`memory::InMemoryStorage`] implements it for tests.
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod memory;
pub mod monitor;
pub mod observer;
pub mod orchestrator;
pub mod pool;
pub mod range;
pub mod record;
pub mod sampling;
pub mod sink;
pub mod stats;
pub mod storage;
pub mod sweep;
pub mod topology;

pub use config::{BenchConfig, Mode};
pub use error::{BenchError, Result, SinkError};
pub use monitor::{ResourceMonitor, ResourceSnapshot, ResourceUsage};
pub use observer::{NoopObserver, RunObserver, RunPlan};
pub use orchestrator::{SessionReport, SweepOrchestrator};
pub use pool::{RequestWorkerPool, RunOutcome};
pub use range::ByteRange;
pub use record::{HostInfo, SummaryRow, UtilizationRow};
pub use sampling::SampleSizer;
pub use sink::{FlushPoint, ResultSink, SessionBuffer};
pub use stats::{BenchmarkRun, LatencySample, LatencyStats, Stat};
pub use storage::{ObjectRef, ObjectStorage, RangeStream, SharedStorage, StorageError};
pub use sweep::{MIB, PayloadSweep, ThreadStep, ThreadSweep};
pub use topology::{HardwareConcurrency, StaticTopology, Topology};
