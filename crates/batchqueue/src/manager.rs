//! Named queue registry and shared scheduler pools
//!
//! [`BatchQueueManager`] is an explicit registry object. Tests create their
//! own instance; applications may use [`BatchQueueManager::global`], which
//! is initialized on first use and torn down with
//! [`shutdown_all`](BatchQueueManager::shutdown_all).
//!
//! # Locking
//!
//! Queue entries live in a `DashMap`; create and get-or-create run under the
//! entry's shard lock, so concurrent callers see one instance. Shared pool
//! refcounts sit behind a separate mutex that is always taken after a shard
//! lock, never before.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use batchqueue_metrics::QueueMetricsProvider;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::config::BatchQueueConfig;
use crate::error::{BatchQueueError, Result};
use crate::handler::TypeKeyed;
use crate::policy::ThreadPolicy;
use crate::queue::BatchQueue;
use crate::scheduler::Scheduler;

/// Type-erased control surface of a registered queue
pub(crate) trait ManagedQueue: Send + Sync {
    fn id(&self) -> u64;
    fn shutdown(&self);
    fn metrics_provider(&self) -> Arc<dyn QueueMetricsProvider>;
}

struct QueueEntry {
    /// The typed `Arc<BatchQueue<T>>`, for downcasting in `get`
    queue: Arc<dyn Any + Send + Sync>,
    control: Arc<dyn ManagedQueue>,
}

impl QueueEntry {
    fn new<T: TypeKeyed + Send + 'static>(queue: &Arc<BatchQueue<T>>) -> Self {
        Self {
            queue: Arc::clone(queue) as Arc<dyn Any + Send + Sync>,
            control: Arc::clone(queue) as Arc<dyn ManagedQueue>,
        }
    }
}

// ============================================================================
// Shared pools
// ============================================================================

struct SharedPool {
    scheduler: Arc<Scheduler>,
    policy: ThreadPolicy,
    refs: usize,
}

/// Refcounted named schedulers
#[derive(Default)]
pub(crate) struct SharedPools {
    pools: Mutex<HashMap<String, SharedPool>>,
}

impl SharedPools {
    /// Take a reference on pool `name`, starting it on first use
    ///
    /// The first registration decides the pool size; a later differing
    /// policy is logged and ignored.
    pub(crate) fn acquire(&self, name: &str, policy: ThreadPolicy) -> Result<Arc<Scheduler>> {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get_mut(name) {
            if pool.policy != policy {
                tracing::warn!(
                    pool = %name,
                    requested = %policy,
                    active = %pool.policy,
                    "shared pool already registered with a different thread policy, keeping the first"
                );
            }
            pool.refs += 1;
            tracing::debug!(pool = %name, refs = pool.refs, "shared pool acquired");
            return Ok(Arc::clone(&pool.scheduler));
        }

        let scheduler = Arc::new(Scheduler::new(name, policy.resolve())?);
        pools.insert(
            name.to_string(),
            SharedPool {
                scheduler: Arc::clone(&scheduler),
                policy,
                refs: 1,
            },
        );
        tracing::debug!(pool = %name, threads = scheduler.thread_count(), "shared pool created");
        Ok(scheduler)
    }

    /// Drop a reference; the last one stops the pool
    pub(crate) fn release(&self, name: &str) {
        let stopped = {
            let mut pools = self.pools.lock();
            let Some(pool) = pools.get_mut(name) else {
                return;
            };
            pool.refs = pool.refs.saturating_sub(1);
            if pool.refs > 0 {
                tracing::debug!(pool = %name, refs = pool.refs, "shared pool released");
                return;
            }
            pools.remove(name)
        };

        // Join workers outside the lock
        if let Some(pool) = stopped {
            pool.scheduler.shutdown();
            tracing::debug!(pool = %name, "shared pool stopped");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pools.lock().len()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// State behind a manager, shared weakly with its queues
#[derive(Default)]
pub(crate) struct Registry {
    queues: DashMap<String, QueueEntry>,
    pools: Arc<SharedPools>,
}

impl Registry {
    pub(crate) fn pools(&self) -> &Arc<SharedPools> {
        &self.pools
    }

    /// Remove `name` if it is still the queue with `id`
    pub(crate) fn detach(&self, name: &str, id: u64) {
        let removed = self.queues.remove_if(name, |_, entry| entry.control.id() == id);
        drop(removed);
    }
}

// ============================================================================
// BatchQueueManager
// ============================================================================

/// Registry of named batch queues
///
/// # Example
///
/// ```ignore
/// let manager = BatchQueueManager::new();
/// let config = BatchQueueConfig::builder()
///     .threads(ThreadPolicy::fixed(2)?)
///     .consumer(Arc::new(|batch: &[Metric]| persist(batch)))
///     .build()?;
/// let queue = manager.create("METRICS_PERSIST", config)?;
/// queue.produce(metric);
/// manager.shutdown_all();
/// ```
#[derive(Default)]
pub struct BatchQueueManager {
    inner: Arc<Registry>,
}

impl BatchQueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide manager, created on first use
    pub fn global() -> &'static BatchQueueManager {
        static GLOBAL: OnceLock<BatchQueueManager> = OnceLock::new();
        GLOBAL.get_or_init(BatchQueueManager::new)
    }

    /// Create and register a queue
    ///
    /// Fails with `AlreadyExists` if the name is taken.
    pub fn create<T>(
        &self,
        name: impl Into<String>,
        config: BatchQueueConfig<T>,
    ) -> Result<Arc<BatchQueue<T>>>
    where
        T: TypeKeyed + Send + 'static,
    {
        let name = name.into();
        config.validate()?;
        match self.inner.queues.entry(name.clone()) {
            Entry::Occupied(_) => Err(BatchQueueError::already_exists(name)),
            Entry::Vacant(slot) => {
                let queue = Arc::new(BatchQueue::start(name, config, &self.inner)?);
                slot.insert(QueueEntry::new(&queue));
                Ok(queue)
            }
        }
    }

    /// Look up a queue; None if absent or carrying another item type
    pub fn get<T>(&self, name: &str) -> Option<Arc<BatchQueue<T>>>
    where
        T: TypeKeyed + Send + 'static,
    {
        let queue = Arc::clone(&self.inner.queues.get(name)?.queue);
        queue.downcast::<BatchQueue<T>>().ok()
    }

    /// Return the existing queue, or create one from `config`
    ///
    /// Concurrent callers observe the same instance. `config` is ignored
    /// when the queue exists.
    pub fn get_or_create<T>(
        &self,
        name: impl Into<String>,
        config: BatchQueueConfig<T>,
    ) -> Result<Arc<BatchQueue<T>>>
    where
        T: TypeKeyed + Send + 'static,
    {
        let name = name.into();
        match self.inner.queues.entry(name.clone()) {
            Entry::Occupied(existing) => {
                let queue = Arc::clone(&existing.get().queue);
                drop(existing);
                queue
                    .downcast::<BatchQueue<T>>()
                    .map_err(|_| BatchQueueError::type_mismatch::<T>(name))
            }
            Entry::Vacant(slot) => {
                config.validate()?;
                let queue = Arc::new(BatchQueue::start(name, config, &self.inner)?);
                slot.insert(QueueEntry::new(&queue));
                Ok(queue)
            }
        }
    }

    /// Shut down and remove a queue; no-op if absent
    pub fn shutdown(&self, name: &str) {
        if let Some((_, entry)) = self.inner.queues.remove(name) {
            entry.control.shutdown();
        }
    }

    /// Shut down and remove every queue
    pub fn shutdown_all(&self) {
        let names: Vec<String> = self
            .inner
            .queues
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for name in &names {
            self.shutdown(name);
        }
        if !names.is_empty() {
            tracing::info!(queues = names.len(), "all batch queues stopped");
        }
    }

    /// Return to the initial empty state, for test isolation
    pub fn reset(&self) {
        self.shutdown_all();
        debug_assert_eq!(self.inner.pools.len(), 0);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.queues.contains_key(name)
    }

    /// Registered queue names, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .queues
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queues.is_empty()
    }

    /// Live shared pools
    pub fn shared_pool_count(&self) -> usize {
        self.inner.pools.len()
    }

    /// Metrics handles for every registered queue, for the usage reporter
    pub fn metrics_providers(&self) -> Vec<Arc<dyn QueueMetricsProvider>> {
        self.inner
            .queues
            .iter()
            .map(|entry| entry.control.metrics_provider())
            .collect()
    }
}

impl Drop for BatchQueueManager {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

impl std::fmt::Debug for BatchQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueueManager")
            .field("queues", &self.len())
            .field("shared_pools", &self.shared_pool_count())
            .finish()
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
