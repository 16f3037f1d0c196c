//! Metrics provider trait and snapshot types
//!
//! Batch queues expose their counters and buffer usage through
//! [`QueueMetricsProvider`], so the reporter can sample any queue without
//! knowing its item type.
//!
//! # Design
//!
//! - Providers are `Send + Sync` and take `&self`
//! - Snapshots are plain copies; sampling never blocks a producer

/// Cumulative counters of one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueCounters {
    /// Items accepted by `produce`
    pub produced: u64,
    /// Items dropped because a partition was full
    pub dropped: u64,
    /// Items rejected after shutdown began
    pub rejected: u64,
    /// Items handed to a consumer
    pub consumed: u64,
    /// Consumer invocations
    pub batches: u64,
    /// Batches whose consumer failed
    pub handler_errors: u64,
    /// Items with no consumer
    pub unhandled: u64,
    /// Rebalanced assignments published
    pub rebalances: u64,
}

/// Buffer occupancy of one queue at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueUsage {
    /// Capacity of each partition
    pub buffer_size: usize,
    /// Items buffered per partition
    pub partitions: Vec<usize>,
}

impl QueueUsage {
    pub fn new(buffer_size: usize, partitions: Vec<usize>) -> Self {
        Self {
            buffer_size,
            partitions,
        }
    }

    #[inline]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Items buffered across all partitions
    pub fn total_used(&self) -> usize {
        self.partitions.iter().sum()
    }

    /// Capacity across all partitions
    pub fn capacity(&self) -> usize {
        self.buffer_size.saturating_mul(self.partitions.len())
    }

    /// Overall fill level in percent, 0.0 for an empty topology
    pub fn used_percentage(&self) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            0.0
        } else {
            self.total_used() as f64 * 100.0 / capacity as f64
        }
    }

    /// Fill level of one partition in percent
    pub fn partition_percentage(&self, index: usize) -> f64 {
        match self.partitions.get(index) {
            Some(&used) if self.buffer_size > 0 => used as f64 * 100.0 / self.buffer_size as f64,
            _ => 0.0,
        }
    }

    /// Up to `n` `(index, used)` pairs, fullest first, lower index on ties
    pub fn hottest(&self, n: usize) -> Vec<(usize, usize)> {
        let mut ranked: Vec<(usize, usize)> = self.partitions.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

/// Source of queue metrics for the reporter
///
/// Queues hand out a cheap handle implementing this trait; the handle stays
/// valid after the queue shuts down.
pub trait QueueMetricsProvider: Send + Sync {
    /// Queue name
    fn name(&self) -> &str;

    /// Current cumulative counters
    fn counters(&self) -> QueueCounters;

    /// Current buffer occupancy
    fn usage(&self) -> QueueUsage;
}
