//! Queue configuration
//!
//! Built once through [`BatchQueueConfigBuilder`] and validated on `build`;
//! the manager validates again at `create`. Invalid values fail fast and are
//! never silently corrected.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::balancer::DrainBalancer;
use crate::error::{BatchQueueError, HandlerError, Result};
use crate::handler::{ErrorHandler, HandlerConsumer, TypeKey, TypeKeyed};
use crate::policy::{BufferStrategy, PartitionPolicy, ThreadPolicy};
use crate::selector::PartitionSelector;

/// Default per-partition capacity
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;

/// Default first idle backoff
pub const DEFAULT_MIN_IDLE: Duration = Duration::from_millis(1);

/// Default idle backoff cap
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_millis(50);

/// Where a queue's drain tasks run
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerMode {
    /// A pool owned by this queue alone
    Dedicated(ThreadPolicy),
    /// A named pool shared with other queues
    Shared { name: String, threads: ThreadPolicy },
}

impl SchedulerMode {
    pub fn threads(&self) -> ThreadPolicy {
        match self {
            Self::Dedicated(threads) | Self::Shared { threads, .. } => *threads,
        }
    }
}

/// Immutable configuration for one batch queue
pub struct BatchQueueConfig<T> {
    pub(crate) scheduler: SchedulerMode,
    pub(crate) partitions: Option<PartitionPolicy>,
    pub(crate) buffer_size: usize,
    pub(crate) strategy: BufferStrategy,
    pub(crate) min_idle: Duration,
    pub(crate) max_idle: Duration,
    pub(crate) max_batch_size: Option<usize>,
    pub(crate) selector: PartitionSelector<T>,
    pub(crate) consumer: Option<Arc<dyn HandlerConsumer<T>>>,
    pub(crate) handlers: HashMap<TypeKey, Arc<dyn HandlerConsumer<T>>>,
    pub(crate) error_handler: Option<ErrorHandler<T>>,
    pub(crate) balancer: Option<(DrainBalancer, Duration)>,
}

impl<T: TypeKeyed> BatchQueueConfig<T> {
    /// Start a builder with defaults
    pub fn builder() -> BatchQueueConfigBuilder<T> {
        BatchQueueConfigBuilder::new()
    }
}

impl<T> BatchQueueConfig<T> {
    /// Check every invariant; called by `build` and again at create
    pub fn validate(&self) -> Result<()> {
        if let SchedulerMode::Shared { name, .. } = &self.scheduler
            && name.trim().is_empty()
        {
            return Err(BatchQueueError::invalid(
                "shared_scheduler",
                "pool name must not be empty",
            ));
        }
        if self.buffer_size == 0 {
            return Err(BatchQueueError::invalid("buffer_size", "must be > 0"));
        }
        if self.min_idle.is_zero() {
            return Err(BatchQueueError::invalid("min_idle", "must be > 0"));
        }
        if self.max_idle < self.min_idle {
            return Err(BatchQueueError::invalid(
                "max_idle",
                format!(
                    "must be >= min_idle ({:?} < {:?})",
                    self.max_idle, self.min_idle
                ),
            ));
        }
        if self.max_batch_size == Some(0) {
            return Err(BatchQueueError::invalid("max_batch_size", "must be > 0"));
        }
        if let Some((_, interval)) = &self.balancer
            && interval.is_zero()
        {
            return Err(BatchQueueError::invalid(
                "balancer",
                "rebalance interval must be > 0",
            ));
        }
        Ok(())
    }

    pub fn scheduler(&self) -> &SchedulerMode {
        &self.scheduler
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn strategy(&self) -> BufferStrategy {
        self.strategy
    }

    pub fn min_idle(&self) -> Duration {
        self.min_idle
    }

    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    /// Largest batch taken from one partition per sweep
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size.unwrap_or(self.buffer_size)
    }

    /// Configured partition policy, defaulting to one partition per thread
    pub fn partition_policy(&self, resolved_threads: usize) -> PartitionPolicy {
        self.partitions
            .unwrap_or_else(|| PartitionPolicy::fixed_clamped(resolved_threads))
    }
}

impl<T> fmt::Debug for BatchQueueConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchQueueConfig")
            .field("scheduler", &self.scheduler)
            .field("partitions", &self.partitions)
            .field("buffer_size", &self.buffer_size)
            .field("strategy", &self.strategy)
            .field("min_idle", &self.min_idle)
            .field("max_idle", &self.max_idle)
            .field("max_batch_size", &self.max_batch_size)
            .field("has_consumer", &self.consumer.is_some())
            .field("handlers", &self.handlers.len())
            .field("balancer", &self.balancer)
            .finish()
    }
}

/// Builder for [`BatchQueueConfig`]
pub struct BatchQueueConfigBuilder<T> {
    threads: Option<ThreadPolicy>,
    shared: Option<(String, ThreadPolicy)>,
    partitions: Option<PartitionPolicy>,
    buffer_size: usize,
    strategy: BufferStrategy,
    min_idle: Duration,
    max_idle: Duration,
    max_batch_size: Option<usize>,
    selector: PartitionSelector<T>,
    consumer: Option<Arc<dyn HandlerConsumer<T>>>,
    handlers: HashMap<TypeKey, Arc<dyn HandlerConsumer<T>>>,
    error_handler: Option<ErrorHandler<T>>,
    balancer: Option<(DrainBalancer, Duration)>,
}

impl<T: TypeKeyed> BatchQueueConfigBuilder<T> {
    pub fn new() -> Self {
        Self {
            threads: None,
            shared: None,
            partitions: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            strategy: BufferStrategy::default(),
            min_idle: DEFAULT_MIN_IDLE,
            max_idle: DEFAULT_MAX_IDLE,
            max_batch_size: None,
            selector: PartitionSelector::type_hash(),
            consumer: None,
            handlers: HashMap::new(),
            error_handler: None,
            balancer: None,
        }
    }
}

impl<T> fmt::Debug for BatchQueueConfigBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchQueueConfigBuilder")
            .field("threads", &self.threads)
            .field("shared", &self.shared)
            .field("partitions", &self.partitions)
            .field("buffer_size", &self.buffer_size)
            .field("strategy", &self.strategy)
            .field("min_idle", &self.min_idle)
            .field("max_idle", &self.max_idle)
            .field("max_batch_size", &self.max_batch_size)
            .field("has_consumer", &self.consumer.is_some())
            .field("handlers", &self.handlers.len())
            .field("has_error_handler", &self.error_handler.is_some())
            .field("balancer", &self.balancer)
            .finish()
    }
}

impl<T: TypeKeyed> Default for BatchQueueConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BatchQueueConfigBuilder<T> {
    /// Run drain tasks on a dedicated pool sized by `policy`
    pub fn threads(mut self, policy: ThreadPolicy) -> Self {
        self.threads = Some(policy);
        self
    }

    /// Run drain tasks on the named shared pool
    ///
    /// The first queue to register a pool name decides its size.
    pub fn shared_scheduler(mut self, name: impl Into<String>, policy: ThreadPolicy) -> Self {
        self.shared = Some((name.into(), policy));
        self
    }

    pub fn partitions(mut self, policy: PartitionPolicy) -> Self {
        self.partitions = Some(policy);
        self
    }

    /// Capacity of each partition
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn strategy(mut self, strategy: BufferStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn min_idle(mut self, idle: Duration) -> Self {
        self.min_idle = idle;
        self
    }

    pub fn max_idle(mut self, idle: Duration) -> Self {
        self.max_idle = idle;
        self
    }

    /// Largest batch taken from one partition per sweep (default: buffer size)
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    pub fn partition_selector(mut self, selector: PartitionSelector<T>) -> Self {
        self.selector = selector;
        self
    }

    /// Default consumer for items without a registered handler
    pub fn consumer(mut self, consumer: Arc<dyn HandlerConsumer<T>>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Register a handler up front; same as `BatchQueue::add_handler`
    pub fn handler(mut self, key: TypeKey, handler: Arc<dyn HandlerConsumer<T>>) -> Self {
        self.handlers.insert(key, handler);
        self
    }

    /// Callback for batches whose consumer failed or panicked
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[T], &HandlerError) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Rebalance partitions every `interval`
    pub fn balancer(mut self, balancer: DrainBalancer, interval: Duration) -> Self {
        self.balancer = Some((balancer, interval));
        self
    }

    /// Validate and freeze
    pub fn build(self) -> Result<BatchQueueConfig<T>> {
        let scheduler = match (self.threads, self.shared) {
            (Some(threads), None) => SchedulerMode::Dedicated(threads),
            (None, Some((name, threads))) => SchedulerMode::Shared { name, threads },
            (Some(_), Some(_)) => {
                return Err(BatchQueueError::invalid(
                    "threads",
                    "set either threads or shared_scheduler, not both",
                ));
            }
            (None, None) => {
                return Err(BatchQueueError::invalid(
                    "threads",
                    "one of threads or shared_scheduler is required",
                ));
            }
        };

        let config = BatchQueueConfig {
            scheduler,
            partitions: self.partitions,
            buffer_size: self.buffer_size,
            strategy: self.strategy,
            min_idle: self.min_idle,
            max_idle: self.max_idle,
            max_batch_size: self.max_batch_size,
            selector: self.selector,
            consumer: self.consumer,
            handlers: self.handlers,
            error_handler: self.error_handler,
            balancer: self.balancer,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
