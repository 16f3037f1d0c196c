//! Batch Queue - Partitioned batching and dispatch
//!
//! Many producer threads hand items to a named queue; a small pool of drain
//! threads pulls them out in batches and delivers each batch to a consumer
//! chosen by the item's type key.
//!
//! # Architecture
//!
//! ```text
//! [Producers]                 [Partitions]                [Drain tasks]
//!    produce ──┐              ┌─ P0 ─┐
//!    produce ──┼──► selector ─┼─ P1 ─┼──► task k owns {Pi} ──► HandlerRegistry ──► consumer(key)
//!    produce ──┘              └─ Pn ─┘         ▲
//!                                              │ ArcSwap<Topology>
//!                       balancer thread ───────┘ (drained/sec per partition)
//! ```
//!
//! # Key Design
//!
//! - **Bounded partitions**: `crossbeam` `ArrayQueue` per partition; full
//!   partitions either drop (`IfPossible`) or block the producer (`Blocking`)
//! - **Single drainer**: every partition has exactly one owning task in the
//!   published assignment, and a drain claim keeps superseded owners out
//! - **Snapshot topology**: growth and rebalancing publish a new immutable
//!   `Topology`; drain tasks re-read it at the start of each sweep
//! - **Idle backoff**: an idle task waits `min_idle`, doubling up to `max_idle`,
//!   as a scheduled delay rather than a parked thread
//! - **Shared pools**: queues may share one named scheduler, refcounted by the
//!   manager
//!
//! # Example
//!
//! ```ignore
//! use batchqueue::{BatchQueueConfig, BatchQueueManager, PartitionPolicy, ThreadPolicy, TypeKey};
//!
//! let manager = BatchQueueManager::new();
//! let config = BatchQueueConfig::builder()
//!     .threads(ThreadPolicy::cpu_cores(0.5)?)
//!     .partitions(PartitionPolicy::adaptive())
//!     .build()?;
//! let queue = manager.create("METRICS_L1_AGGREGATION", config)?;
//!
//! queue.add_handler(TypeKey::new("service_cpm"), Arc::new(cpm_worker));
//! queue.produce(metric);
//!
//! manager.shutdown_all();
//! ```

mod balancer;
mod config;
mod drain;
mod error;
mod handler;
mod manager;
mod metrics;
mod partition;
mod policy;
mod queue;
mod scheduler;
mod selector;
mod settings;
mod state;
mod stats;
mod topology;

pub use balancer::{DEFAULT_MIN_GAIN, DrainBalancer};
pub use config::{
    BatchQueueConfig, BatchQueueConfigBuilder, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_IDLE,
    DEFAULT_MIN_IDLE, SchedulerMode,
};
pub use error::{BatchQueueError, BoxError, HandlerError, Result};
pub use handler::{ErrorHandler, HandlerConsumer, TypeKey, TypeKeyed};
pub use manager::BatchQueueManager;
pub use metrics::{DropTracker, MetricsSnapshot, QueueMetrics};
pub use policy::{
    BufferStrategy, DEFAULT_ADAPTIVE_MULTIPLIER, PartitionPolicy, ThreadPolicy, available_cpus,
};
pub use queue::{BatchQueue, QueueMetricsHandle};
pub use selector::PartitionSelector;
pub use settings::{PartitionSettings, QueueSettings, ThreadSettings};
pub use state::QueueState;
pub use stats::{BatchQueueStats, PartitionUsage};

// Re-export the reporting surface so callers need one dependency
pub use batchqueue_metrics::{QueueCounters, QueueMetricsProvider, QueueUsage};
