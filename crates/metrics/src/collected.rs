//! Collected queue snapshots and rate calculations
//!
//! One [`CollectedQueues`] holds every sampled queue at a point in time;
//! comparing two collections yields per-second rates.

use std::time::{Duration, Instant};

use crate::{QueueCounters, QueueUsage};

/// One sampled queue
#[derive(Debug, Clone)]
pub struct CollectedQueue {
    /// Queue name
    pub name: String,
    /// Cumulative counters
    pub counters: QueueCounters,
    /// Buffer occupancy
    pub usage: QueueUsage,
}

/// Every queue sampled at one instant
#[derive(Debug, Clone, Default)]
pub struct CollectedQueues {
    /// When this collection was taken
    pub timestamp: Option<Instant>,

    /// Sampled queues in provider order
    pub queues: Vec<CollectedQueue>,
}

impl CollectedQueues {
    /// Create a new empty collection stamped now
    pub fn new() -> Self {
        Self {
            timestamp: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Look up a queue by name
    pub fn queue(&self, name: &str) -> Option<&CollectedQueue> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// Calculate rates against an earlier collection
    ///
    /// Queues are matched by name; a queue missing from `previous` has no
    /// rate yet. Returns None without timestamps or with zero elapsed time.
    pub fn rates(&self, previous: &CollectedQueues) -> Option<QueueRates> {
        let current_ts = self.timestamp?;
        let previous_ts = previous.timestamp?;

        let elapsed = current_ts.duration_since(previous_ts);
        if elapsed.is_zero() {
            return None;
        }
        let elapsed_secs = elapsed.as_secs_f64();

        let queues = self
            .queues
            .iter()
            .filter_map(|current| {
                let prev = previous.queue(&current.name)?;
                let (now, before) = (&current.counters, &prev.counters);
                Some(QueueRate {
                    name: current.name.clone(),
                    produced_per_sec: rate(now.produced, before.produced, elapsed_secs),
                    consumed_per_sec: rate(now.consumed, before.consumed, elapsed_secs),
                    batches_per_sec: rate(now.batches, before.batches, elapsed_secs),
                    dropped: now.dropped.saturating_sub(before.dropped),
                    rejected: now.rejected.saturating_sub(before.rejected),
                    handler_errors: now.handler_errors.saturating_sub(before.handler_errors),
                    rebalances: now.rebalances.saturating_sub(before.rebalances),
                })
            })
            .collect();

        Some(QueueRates { elapsed, queues })
    }
}

/// Rates over one reporting interval
#[derive(Debug, Clone)]
pub struct QueueRates {
    /// Time between the two collections
    pub elapsed: Duration,
    /// Per-queue rates, for queues present in both collections
    pub queues: Vec<QueueRate>,
}

impl QueueRates {
    pub fn queue(&self, name: &str) -> Option<&QueueRate> {
        self.queues.iter().find(|q| q.name == name)
    }
}

/// Rates for one queue
#[derive(Debug, Clone)]
pub struct QueueRate {
    pub name: String,
    pub produced_per_sec: f64,
    pub consumed_per_sec: f64,
    pub batches_per_sec: f64,
    /// Drops during the interval
    pub dropped: u64,
    /// Rejections during the interval
    pub rejected: u64,
    /// Failed batches during the interval
    pub handler_errors: u64,
    /// Rebalances during the interval
    pub rebalances: u64,
}

/// Per-second rate between two counter values
#[inline]
fn rate(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    current.saturating_sub(previous) as f64 / elapsed_secs
}
