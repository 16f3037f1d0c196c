//! The batch queue
//!
//! # Architecture
//!
//! ```text
//! produce(item) ── selector ──► Partition[i] (ArrayQueue)
//!                                   │
//!               ArcSwap<Topology> ──┤ owner(i) = task k
//!                                   ▼
//!                         DrainTask k (scheduler job) ──► HandlerRegistry ──► consumers
//!
//! balancer thread: drained counts ──► DrainBalancer ──► swap Topology
//! ```
//!
//! # Lifecycle
//!
//! `Running` accepts items. `shutdown` moves to `Stopping`, waits for
//! in-flight producers and sweeps to leave, drains every partition through
//! the existing handlers, and ends in `Stopped` before releasing the
//! scheduler. Only the caller that moved the queue to `Stopping` does this
//! work; other callers wait for it to reach `Stopped`.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use batchqueue_metrics::{QueueCounters, QueueMetricsProvider, QueueUsage};
use parking_lot::{Condvar, Mutex};

use crate::balancer::DrainBalancer;
use crate::config::{BatchQueueConfig, SchedulerMode};
use crate::drain::{DrainTask, sweeping_queue};
use crate::error::{BatchQueueError, Result};
use crate::handler::{HandlerConsumer, HandlerRegistry, TypeKey, TypeKeyed};
use crate::manager::{ManagedQueue, Registry, SharedPools};
use crate::metrics::{DropTracker, MetricsSnapshot, QueueMetrics};
use crate::partition::Enqueue;
use crate::policy::{BufferStrategy, PartitionPolicy};
use crate::scheduler::Scheduler;
use crate::selector::PartitionSelector;
use crate::state::{QueueState, StateCell};
use crate::stats::BatchQueueStats;
use crate::topology::{Assignment, Topology};

/// Poll interval while shutdown waits for producers and sweeps to leave
const QUIESCE_POLL: Duration = Duration::from_millis(1);

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// QueueCore - state shared with drain tasks and the balancer
// ============================================================================

pub(crate) struct QueueCore<T> {
    pub(crate) id: u64,
    pub(crate) name: String,
    strategy: BufferStrategy,
    buffer_size: usize,
    pub(crate) max_batch: usize,
    pub(crate) min_idle: Duration,
    pub(crate) max_idle: Duration,
    pub(crate) state: StateCell,
    pub(crate) topology: ArcSwap<Topology<T>>,
    /// Serializes topology replacement (growth, rebalance, shutdown fence)
    topology_lock: Mutex<()>,
    pub(crate) registry: HandlerRegistry<T>,
    selector: PartitionSelector<T>,
    pub(crate) metrics: Arc<QueueMetrics>,
    drops: DropTracker,
    /// Sweeps currently between entry check and exit
    pub(crate) active_sweeps: AtomicUsize,
}

impl<T> QueueCore<T> {
    fn usage(&self) -> BatchQueueStats {
        let topology = self.topology.load();
        BatchQueueStats::new(
            self.buffer_size,
            topology.partitions.iter().map(|p| p.len()).collect(),
        )
    }

    /// Apply one balancer round over the drain counts since the last one
    fn rebalance(&self, balancer: &DrainBalancer, elapsed: Duration) {
        let _lock = self.topology_lock.lock();
        if !self.state.is_running() {
            return;
        }

        let current = self.topology.load_full();
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let rates: Vec<f64> = current
            .partitions
            .iter()
            .map(|p| p.take_drained() as f64 / secs)
            .collect();

        let assignment = &current.assignment;
        let task_count = assignment.task_count();
        let loads: Vec<f64> = (0..task_count)
            .map(|task| assignment.owned_by(task).iter().map(|&p| rates[p]).sum())
            .collect();
        tracing::debug!(queue = %self.name, loads = ?loads, "rebalance check");

        let Some(owners) = balancer.assign(&rates, assignment.owners(), task_count) else {
            return;
        };
        let next = Assignment::from_owners(owners, task_count);
        if !next.is_valid() {
            tracing::warn!(queue = %self.name, "balancer produced an invalid assignment, keeping current");
            return;
        }
        let moved = next.moved_from(assignment);
        if moved == 0 {
            return;
        }

        self.topology.store(Arc::new(current.reassigned(next)));
        self.metrics.record_rebalance(moved as u64);
        tracing::info!(queue = %self.name, moved, "partitions rebalanced");
    }
}

#[cfg(test)]
impl<T: TypeKeyed> QueueCore<T> {
    /// Core with a fixed topology and no threads, for driving jobs by hand
    pub(crate) fn detached(
        config: BatchQueueConfig<T>,
        partition_count: usize,
        task_count: usize,
    ) -> Self {
        let max_batch = config.max_batch_size();
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            name: "detached".to_string(),
            strategy: config.strategy,
            buffer_size: config.buffer_size,
            max_batch,
            min_idle: config.min_idle,
            max_idle: config.max_idle,
            state: StateCell::new(),
            topology: ArcSwap::from_pointee(Topology::new(
                partition_count,
                task_count,
                config.buffer_size,
            )),
            topology_lock: Mutex::new(()),
            registry: HandlerRegistry::new(config.handlers, config.consumer, config.error_handler),
            selector: config.selector,
            metrics: Arc::new(QueueMetrics::new()),
            drops: DropTracker::new(),
            active_sweeps: AtomicUsize::new(0),
        }
    }
}

// ============================================================================
// Scheduler lease
// ============================================================================

enum SchedulerLease {
    Dedicated(Arc<Scheduler>),
    Shared {
        pool: String,
        scheduler: Arc<Scheduler>,
        pools: Arc<SharedPools>,
    },
}

impl SchedulerLease {
    fn scheduler(&self) -> &Scheduler {
        match self {
            Self::Dedicated(scheduler) | Self::Shared { scheduler, .. } => scheduler,
        }
    }

    fn release(&self) {
        match self {
            Self::Dedicated(scheduler) => scheduler.shutdown(),
            Self::Shared { pool, pools, .. } => pools.release(pool),
        }
    }
}

// ============================================================================
// Balancer thread
// ============================================================================

struct BalancerStop {
    stopped: Mutex<bool>,
    wake: Condvar,
}

struct BalancerHandle {
    stop: Arc<BalancerStop>,
    thread: JoinHandle<()>,
}

impl BalancerHandle {
    fn spawn<T: Send + 'static>(
        core: Arc<QueueCore<T>>,
        balancer: DrainBalancer,
        interval: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(BalancerStop {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let name = format!("{}-balancer", core.name);
        let signal = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_balancer(&core, balancer, interval, &signal))
            .map_err(|source| BatchQueueError::spawn(name, source))?;
        Ok(Self { stop, thread })
    }

    fn stop(self) {
        *self.stop.stopped.lock() = true;
        self.stop.wake.notify_all();
        if self.thread.join().is_err() {
            tracing::error!("balancer thread panicked");
        }
    }
}

fn run_balancer<T>(
    core: &QueueCore<T>,
    balancer: DrainBalancer,
    interval: Duration,
    stop: &BalancerStop,
) {
    let mut last = Instant::now();
    loop {
        {
            let mut stopped = stop.stopped.lock();
            if !*stopped {
                stop.wake.wait_for(&mut stopped, interval);
            }
            if *stopped {
                return;
            }
        }
        let now = Instant::now();
        core.rebalance(&balancer, now - last);
        last = now;
    }
}

// ============================================================================
// BatchQueue
// ============================================================================

/// A named, partitioned batching queue
///
/// Producers call [`produce`](Self::produce) from any thread; drain tasks
/// deliver batches to the registered consumers. Created through
/// [`BatchQueueManager`](crate::BatchQueueManager).
pub struct BatchQueue<T> {
    core: Arc<QueueCore<T>>,
    partition_policy: PartitionPolicy,
    resolved_threads: usize,
    task_count: usize,
    lease: SchedulerLease,
    balancer: Mutex<Option<BalancerHandle>>,
    rebalancing: bool,
    /// Thread running the shutdown, set by the caller that won `Running -> Stopping`
    stopper: Mutex<Option<ThreadId>>,
    /// Set once the final drain has finished
    drained: Mutex<bool>,
    drained_cv: Condvar,
    registry: Weak<Registry>,
}

impl<T: TypeKeyed + Send + 'static> BatchQueue<T> {
    /// Build the topology, start drain tasks, and start the balancer
    pub(crate) fn start(
        name: String,
        config: BatchQueueConfig<T>,
        registry: &Arc<Registry>,
    ) -> Result<Self> {
        config.validate()?;
        let handler_count = config.handlers.len();

        // Dedicated pools are sized after partitions resolve; shared pools
        // exist first and fix the thread count
        let (resolved_threads, shared) = match &config.scheduler {
            SchedulerMode::Dedicated(policy) => (policy.resolve(), None),
            SchedulerMode::Shared { name: pool, threads } => {
                let scheduler = registry.pools().acquire(pool, *threads)?;
                (scheduler.thread_count(), Some((pool.clone(), scheduler)))
            }
        };

        let partition_policy = config.partition_policy(resolved_threads);
        let partition_count = partition_policy.resolve(resolved_threads, handler_count);
        let task_count = resolved_threads.min(partition_count);
        if task_count < resolved_threads {
            tracing::warn!(
                queue = %name,
                threads = resolved_threads,
                partitions = partition_count,
                "fewer partitions than threads, reducing drain tasks to partition count"
            );
        }

        let lease = match shared {
            Some((pool, scheduler)) => SchedulerLease::Shared {
                pool,
                scheduler,
                pools: Arc::clone(registry.pools()),
            },
            None => SchedulerLease::Dedicated(Arc::new(Scheduler::new(name.clone(), task_count)?)),
        };

        let max_batch = config.max_batch_size();
        let BatchQueueConfig {
            buffer_size,
            strategy,
            min_idle,
            max_idle,
            selector,
            consumer,
            handlers,
            error_handler,
            balancer,
            ..
        } = config;

        let core = Arc::new(QueueCore {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            strategy,
            buffer_size,
            max_batch,
            min_idle,
            max_idle,
            state: StateCell::new(),
            topology: ArcSwap::from_pointee(Topology::new(
                partition_count,
                task_count,
                buffer_size,
            )),
            topology_lock: Mutex::new(()),
            registry: HandlerRegistry::new(handlers, consumer, error_handler),
            selector,
            metrics: Arc::new(QueueMetrics::new()),
            drops: DropTracker::new(),
            active_sweeps: AtomicUsize::new(0),
        });

        let rebalancing = balancer.is_some() && task_count > 1;
        let balancer_handle = match balancer {
            Some((balancer, interval)) if rebalancing => {
                match BalancerHandle::spawn(Arc::clone(&core), balancer, interval) {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        core.state.store(QueueState::Stopped);
                        lease.release();
                        return Err(err);
                    }
                }
            }
            _ => None,
        };

        let scheduler = lease.scheduler();
        for task in 0..task_count {
            scheduler.schedule(
                Arc::new(DrainTask::new(task, Arc::clone(&core))),
                Duration::ZERO,
            );
        }

        tracing::info!(
            queue = %core.name,
            partitions = partition_count,
            tasks = task_count,
            scheduler = %scheduler.name(),
            dedicated = matches!(lease, SchedulerLease::Dedicated(_)),
            default_consumer = core.registry.has_default(),
            rebalancing,
            "batch queue started"
        );

        Ok(Self {
            core,
            partition_policy,
            resolved_threads,
            task_count,
            lease,
            balancer: Mutex::new(balancer_handle),
            rebalancing,
            stopper: Mutex::new(None),
            drained: Mutex::new(false),
            drained_cv: Condvar::new(),
            registry: Arc::downgrade(registry),
        })
    }

    /// Offer one item
    ///
    /// Returns false when the item was dropped (full partition under
    /// `IfPossible`) or rejected (queue stopping or stopped). Under
    /// `Blocking` this waits for space.
    pub fn produce(&self, item: T) -> bool {
        let core = &self.core;
        if !core.state.is_running() {
            core.metrics.record_rejected();
            return false;
        }

        let partition = {
            let topology = core.topology.load();
            let count = topology.partition_count();
            let index = if count == 1 {
                0
            } else {
                core.selector.select(&item, count)
            };
            Arc::clone(&topology.partitions[index])
        };

        match partition.enqueue(item, core.strategy, &core.state) {
            Enqueue::Accepted => {
                core.metrics.record_produced();
                true
            }
            Enqueue::Full => {
                core.metrics.record_dropped();
                core.drops.record_drop(&core.name);
                false
            }
            Enqueue::Stopped => {
                core.metrics.record_rejected();
                false
            }
        }
    }

    /// Register or replace the handler for `key`
    ///
    /// Under an adaptive partition policy this may grow the partition count.
    /// Buffered items stay where they are; new partitions join the
    /// assignment round-robin.
    pub fn add_handler(&self, key: TypeKey, handler: Arc<dyn HandlerConsumer<T>>) {
        let core = &self.core;
        let handler_count = core.registry.register(key, handler);
        if !self.partition_policy.is_adaptive() {
            return;
        }

        let _lock = core.topology_lock.lock();
        if !core.state.is_running() {
            return;
        }
        let current = core.topology.load_full();
        let target = self
            .partition_policy
            .resolve(self.resolved_threads, handler_count);
        if target <= current.partition_count() {
            return;
        }

        core.topology
            .store(Arc::new(current.grown(target, core.buffer_size)));
        tracing::info!(
            queue = %core.name,
            from = current.partition_count(),
            to = target,
            handlers = handler_count,
            "partitions grown"
        );
    }

    /// Number of registered type handlers
    pub fn handler_count(&self) -> usize {
        self.core.registry.len()
    }

    /// Stop accepting items and deliver everything already buffered
    ///
    /// Blocks until the final drain completes. Idempotent; concurrent
    /// callers wait for the caller that started the shutdown. A consumer
    /// calling this from inside a drain of the same queue returns at once.
    pub fn shutdown(&self) {
        let core = &self.core;
        if !core.state.transition(QueueState::Running, QueueState::Stopping) {
            self.await_drained();
            return;
        }
        *self.stopper.lock() = Some(thread::current().id());

        // Growth and rebalance publish only while running
        drop(core.topology_lock.lock());
        let topology = core.topology.load_full();
        for partition in &topology.partitions {
            partition.wake_producers();
        }
        self.await_quiescence(&topology);

        if let Some(handle) = self.balancer.lock().take() {
            handle.stop();
        }

        let drained = self.final_drain(&topology);
        core.drops.flush(&core.name);
        core.state.store(QueueState::Stopped);
        *self.drained.lock() = true;
        self.drained_cv.notify_all();

        // Waiters may run on this pool; wake them before releasing it
        self.lease.release();
        tracing::info!(queue = %core.name, drained, "batch queue stopped");

        if let Some(registry) = self.registry.upgrade() {
            registry.detach(&core.name, core.id);
        }
    }

    /// Wait for a shutdown started by another caller
    ///
    /// Returns at once on the thread running that shutdown, or inside a
    /// sweep of this queue, since either would wait on itself.
    fn await_drained(&self) {
        let core = &self.core;
        if sweeping_queue() == Some(core.id)
            || *self.stopper.lock() == Some(thread::current().id())
        {
            return;
        }
        let mut drained = self.drained.lock();
        while !*drained {
            self.drained_cv.wait(&mut drained);
        }
    }

    /// Wait until no producer is inside `enqueue` and no sweep is running
    ///
    /// A sweep of this queue on the calling thread (a consumer shutting down
    /// its own queue) is not waited for.
    fn await_quiescence(&self, topology: &Topology<T>) {
        let core = &self.core;
        let own_sweep = usize::from(sweeping_queue() == Some(core.id));
        loop {
            let producers: usize = topology.partitions.iter().map(|p| p.in_flight()).sum();
            if producers == 0 && core.active_sweeps.load(Ordering::SeqCst) <= own_sweep {
                return;
            }
            thread::sleep(QUIESCE_POLL);
        }
    }

    fn final_drain(&self, topology: &Topology<T>) -> usize {
        let core = &self.core;
        let mut drained = 0;
        for partition in &topology.partitions {
            loop {
                let batch = partition.drain_unclaimed(core.max_batch);
                if batch.is_empty() {
                    break;
                }
                drained += batch.len();
                core.registry.dispatch(&core.name, batch, &core.metrics);
            }
        }
        drained
    }
}

impl<T> BatchQueue<T> {
    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn state(&self) -> QueueState {
        self.core.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.core.state.is_running()
    }

    /// Current number of partitions
    pub fn partition_count(&self) -> usize {
        self.core.topology.load().partition_count()
    }

    /// Number of drain tasks, fixed at creation
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    /// Partition indices owned by each task in the published assignment
    pub fn assigned_partitions(&self) -> Vec<Vec<usize>> {
        self.core.topology.load().assignment.task_sets()
    }

    /// Point-in-time buffer usage
    pub fn stats(&self) -> BatchQueueStats {
        self.core.usage()
    }

    /// True unless the queue runs on a named shared pool
    pub fn is_dedicated_scheduler(&self) -> bool {
        matches!(self.lease, SchedulerLease::Dedicated(_))
    }

    /// True when a balancer is configured and there is more than one task
    pub fn is_rebalancing_enabled(&self) -> bool {
        self.rebalancing
    }

    /// Snapshot of this queue's counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// Get a metrics handle for reporting
    ///
    /// The handle implements `QueueMetricsProvider` and stays valid after
    /// the queue shuts down.
    pub fn metrics_handle(&self) -> QueueMetricsHandle<T> {
        QueueMetricsHandle {
            core: Arc::clone(&self.core),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.core.id
    }
}

impl<T> fmt::Debug for BatchQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchQueue")
            .field("name", &self.core.name)
            .field("state", &self.state())
            .field("partitions", &self.partition_count())
            .field("tasks", &self.task_count)
            .field("scheduler", &self.lease.scheduler().name())
            .finish()
    }
}

impl<T: TypeKeyed + Send + 'static> ManagedQueue for BatchQueue<T> {
    fn id(&self) -> u64 {
        BatchQueue::id(self)
    }

    fn shutdown(&self) {
        BatchQueue::shutdown(self);
    }

    fn metrics_provider(&self) -> Arc<dyn QueueMetricsProvider> {
        Arc::new(self.metrics_handle())
    }
}

// ============================================================================
// Metrics handle
// ============================================================================

/// Handle for reading queue metrics externally
///
/// Implements `QueueMetricsProvider` for the usage reporter.
pub struct QueueMetricsHandle<T> {
    core: Arc<QueueCore<T>>,
}

impl<T> Clone for QueueMetricsHandle<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static> QueueMetricsProvider for QueueMetricsHandle<T> {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn counters(&self) -> QueueCounters {
        self.core.metrics.snapshot().counters()
    }

    fn usage(&self) -> QueueUsage {
        let (buffer_size, used) = self.core.usage().into_parts();
        QueueUsage::new(buffer_size, used)
    }
}
