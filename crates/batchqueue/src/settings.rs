//! Serde settings for queues loaded from TOML
//!
//! [`QueueSettings`] mirrors the non-closure options of
//! [`BatchQueueConfig`](crate::BatchQueueConfig). Consumers, handlers, and
//! selectors are attached to the builder it returns.
//!
//! # Example
//!
//! ```toml
//! shared_pool = "METRICS_L1_POOL"
//! threads = { kind = "cpu_cores", multiplier = 0.5 }
//! partitions = { kind = "adaptive" }
//! buffer_size = 20000
//! strategy = "if_possible"
//! max_idle = "100ms"
//! rebalance_interval = "10s"
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::balancer::DrainBalancer;
use crate::config::{
    BatchQueueConfig, BatchQueueConfigBuilder, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_IDLE,
    DEFAULT_MIN_IDLE,
};
use crate::error::{BatchQueueError, Result};
use crate::handler::TypeKeyed;
use crate::policy::{
    BufferStrategy, DEFAULT_ADAPTIVE_MULTIPLIER, PartitionPolicy, ThreadPolicy,
};

/// Thread policy as written in settings
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ThreadSettings {
    Fixed { count: usize },
    CpuCores { multiplier: f64 },
    CpuCoresWithBase { base: usize, multiplier: f64 },
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self::CpuCores { multiplier: 1.0 }
    }
}

impl ThreadSettings {
    pub fn to_policy(self) -> Result<ThreadPolicy> {
        match self {
            Self::Fixed { count } => ThreadPolicy::fixed(count),
            Self::CpuCores { multiplier } => ThreadPolicy::cpu_cores(multiplier),
            Self::CpuCoresWithBase { base, multiplier } => {
                ThreadPolicy::cpu_cores_with_base(base, multiplier)
            }
        }
    }
}

/// Partition policy as written in settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum PartitionSettings {
    Fixed {
        count: usize,
    },
    ThreadMultiply {
        factor: usize,
    },
    Adaptive {
        #[serde(default = "default_adaptive_multiplier")]
        multiplier: usize,
    },
}

fn default_adaptive_multiplier() -> usize {
    DEFAULT_ADAPTIVE_MULTIPLIER
}

impl PartitionSettings {
    pub fn to_policy(self) -> Result<PartitionPolicy> {
        match self {
            Self::Fixed { count } => PartitionPolicy::fixed(count),
            Self::ThreadMultiply { factor } => PartitionPolicy::thread_multiply(factor),
            Self::Adaptive { multiplier } => PartitionPolicy::adaptive_with(multiplier),
        }
    }
}

/// Deserializable queue options
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSettings {
    /// Drain threads, or the size of `shared_pool` when set
    pub threads: ThreadSettings,

    /// Run on this named shared pool instead of a dedicated one
    pub shared_pool: Option<String>,

    /// Partition policy (default: one per thread)
    pub partitions: Option<PartitionSettings>,

    /// Capacity of each partition
    pub buffer_size: usize,

    pub strategy: BufferStrategy,

    #[serde(with = "humantime_serde")]
    pub min_idle: Duration,

    #[serde(with = "humantime_serde")]
    pub max_idle: Duration,

    pub max_batch_size: Option<usize>,

    /// Enables the throughput-weighted balancer at this interval
    #[serde(with = "humantime_serde::option")]
    pub rebalance_interval: Option<Duration>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            threads: ThreadSettings::default(),
            shared_pool: None,
            partitions: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            strategy: BufferStrategy::default(),
            min_idle: DEFAULT_MIN_IDLE,
            max_idle: DEFAULT_MAX_IDLE,
            max_batch_size: None,
            rebalance_interval: None,
        }
    }
}

impl QueueSettings {
    /// Convert to a builder, validating the policies
    ///
    /// The remaining checks run in `build`.
    pub fn into_builder<T: TypeKeyed>(self) -> Result<BatchQueueConfigBuilder<T>> {
        let threads = self.threads.to_policy()?;
        let mut builder = BatchQueueConfig::builder();
        builder = match self.shared_pool {
            Some(pool) => builder.shared_scheduler(pool, threads),
            None => builder.threads(threads),
        };
        if let Some(partitions) = self.partitions {
            builder = builder.partitions(partitions.to_policy()?);
        }
        builder = builder
            .buffer_size(self.buffer_size)
            .strategy(self.strategy)
            .min_idle(self.min_idle)
            .max_idle(self.max_idle);
        if let Some(size) = self.max_batch_size {
            builder = builder.max_batch_size(size);
        }
        if let Some(interval) = self.rebalance_interval {
            builder = builder.balancer(DrainBalancer::throughput_weighted(), interval);
        }
        Ok(builder)
    }
}

impl FromStr for QueueSettings {
    type Err = BatchQueueError;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BatchQueueError::Settings(e.to_string()))
    }
}
