//! Batch queue metrics
//!
//! Atomic counters for one queue. All operations use relaxed ordering;
//! values are eventually consistent, not real-time.

use std::sync::atomic::{AtomicU64, Ordering};

use batchqueue_metrics::QueueCounters;

/// Counters for one batch queue
///
/// # Thread Safety
///
/// All methods are safe to call from producer and drain threads
/// concurrently. Reads may be slightly stale.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Items accepted by `produce`
    produced: AtomicU64,

    /// Items dropped because the partition was full (IfPossible)
    dropped: AtomicU64,

    /// Items rejected because the queue was stopping or stopped
    rejected: AtomicU64,

    /// Items handed to a consumer, whether or not it succeeded
    consumed: AtomicU64,

    /// Consumer invocations
    batches: AtomicU64,

    /// Batches whose consumer failed or panicked
    handler_errors: AtomicU64,

    /// Items with no handler and no default consumer
    unhandled: AtomicU64,

    /// Sweeps that found every owned partition empty
    idle_sweeps: AtomicU64,

    /// Rebalanced assignments published
    rebalances: AtomicU64,

    /// Partitions that changed owner across all rebalances
    partitions_moved: AtomicU64,
}

impl QueueMetrics {
    /// Create new metrics with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            produced: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            unhandled: AtomicU64::new(0),
            idle_sweeps: AtomicU64::new(0),
            rebalances: AtomicU64::new(0),
            partitions_moved: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one consumer invocation over `items` items
    #[inline]
    pub fn record_batch(&self, items: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.consumed.fetch_add(items, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unhandled(&self, items: u64) {
        self.unhandled.fetch_add(items, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_idle_sweep(&self) {
        self.idle_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a published rebalance that moved `moved` partitions
    #[inline]
    pub fn record_rebalance(&self, moved: u64) {
        self.rebalances.fetch_add(1, Ordering::Relaxed);
        self.partitions_moved.fetch_add(moved, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            produced: self.produced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            idle_sweeps: self.idle_sweeps.load(Ordering::Relaxed),
            rebalances: self.rebalances.load(Ordering::Relaxed),
            partitions_moved: self.partitions_moved.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of queue metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub produced: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub consumed: u64,
    pub batches: u64,
    pub handler_errors: u64,
    pub unhandled: u64,
    pub idle_sweeps: u64,
    pub rebalances: u64,
    pub partitions_moved: u64,
}

impl MetricsSnapshot {
    /// Fraction of produce attempts that were dropped (0.0 - 1.0)
    ///
    /// Returns None if nothing was attempted.
    pub fn drop_rate(&self) -> Option<f64> {
        let attempts = self.produced + self.dropped;
        if attempts == 0 {
            None
        } else {
            Some(self.dropped as f64 / attempts as f64)
        }
    }

    /// Average items per consumer invocation
    pub fn avg_batch_size(&self) -> Option<f64> {
        if self.batches == 0 {
            None
        } else {
            Some(self.consumed as f64 / self.batches as f64)
        }
    }

    /// Counters in the reporter's shape
    pub fn counters(&self) -> QueueCounters {
        QueueCounters {
            produced: self.produced,
            dropped: self.dropped,
            rejected: self.rejected,
            consumed: self.consumed,
            batches: self.batches,
            handler_errors: self.handler_errors,
            unhandled: self.unhandled,
            rebalances: self.rebalances,
        }
    }

    /// Difference from an earlier snapshot
    pub fn diff(&self, previous: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            produced: self.produced.saturating_sub(previous.produced),
            dropped: self.dropped.saturating_sub(previous.dropped),
            rejected: self.rejected.saturating_sub(previous.rejected),
            consumed: self.consumed.saturating_sub(previous.consumed),
            batches: self.batches.saturating_sub(previous.batches),
            handler_errors: self.handler_errors.saturating_sub(previous.handler_errors),
            unhandled: self.unhandled.saturating_sub(previous.unhandled),
            idle_sweeps: self.idle_sweeps.saturating_sub(previous.idle_sweeps),
            rebalances: self.rebalances.saturating_sub(previous.rebalances),
            partitions_moved: self
                .partitions_moved
                .saturating_sub(previous.partitions_moved),
        }
    }
}

// ============================================================================
// Drop Tracker - Rate-limited logging for IfPossible drops
// ============================================================================

/// Rate-limited drop logging
///
/// Aggregates drops and logs one summary per interval instead of one line
/// per dropped item. The first drop logs at once; drops still pending when
/// the queue stops are logged by [`flush`](Self::flush).
///
/// # Thresholds
///
/// - >0 drops/interval: WARN level
/// - >10,000 drops/interval: ERROR level (drain threads cannot keep up)
pub struct DropTracker {
    /// Drops in current interval
    interval_drops: AtomicU64,
    /// Last log time (epoch milliseconds)
    last_log_ms: AtomicU64,
}

/// Log interval in milliseconds
const LOG_INTERVAL_MS: u64 = 1000;
/// Drops per interval that escalate to ERROR level
const CRITICAL_DROP_THRESHOLD: u64 = 10_000;

impl DropTracker {
    /// Create a new tracker
    pub fn new() -> Self {
        Self {
            interval_drops: AtomicU64::new(0),
            last_log_ms: AtomicU64::new(0),
        }
    }

    /// Record one dropped item, logging a summary if the interval elapsed
    ///
    /// Returns true if a log was emitted.
    pub fn record_drop(&self, queue: &str) -> bool {
        self.interval_drops.fetch_add(1, Ordering::Relaxed);
        self.maybe_log(queue)
    }

    fn maybe_log(&self, queue: &str) -> bool {
        let now = Self::now_ms();
        let last = self.last_log_ms.load(Ordering::Relaxed);

        if now.saturating_sub(last) < LOG_INTERVAL_MS {
            return false;
        }

        // Claim the log slot so concurrent producers don't log twice
        if self
            .last_log_ms
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        self.emit(queue)
    }

    /// Log any drops not yet reported
    ///
    /// Returns true if a log was emitted.
    pub fn flush(&self, queue: &str) -> bool {
        self.last_log_ms.store(Self::now_ms(), Ordering::SeqCst);
        self.emit(queue)
    }

    fn emit(&self, queue: &str) -> bool {
        let drops = self.interval_drops.swap(0, Ordering::Relaxed);
        if drops == 0 {
            return false;
        }

        if drops > CRITICAL_DROP_THRESHOLD {
            tracing::error!(
                queue = %queue,
                dropped = drops,
                threshold = CRITICAL_DROP_THRESHOLD,
                "CRITICAL: batch queue dropping items - drain threads cannot keep up"
            );
        } else {
            tracing::warn!(queue = %queue, dropped = drops, "batch queue full, items dropped");
        }

        true
    }

    #[inline]
    fn now_ms() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn current_drops(&self) -> u64 {
        self.interval_drops.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn backdate(&self, ms: u64) {
        self.last_log_ms
            .store(Self::now_ms().saturating_sub(ms), Ordering::Relaxed);
    }
}

impl Default for DropTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DropTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropTracker")
            .field(
                "interval_drops",
                &self.interval_drops.load(Ordering::Relaxed),
            )
            .finish()
    }
}
