//! Bounded partition buffer
//!
//! Producers push into a lock-free `ArrayQueue`. Blocked producers park on a
//! condvar that drains signal only when someone is actually waiting, so the
//! uncontended produce path never touches a lock.
//!
//! Draining requires a [`DrainClaim`]: an exclusive, RAII-released flag held
//! across dequeue and dispatch. Two drain tasks can never work the same
//! partition at once, even while a rebalance is being published.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};

use crate::policy::BufferStrategy;
use crate::state::StateCell;

/// Longest a blocked producer sleeps before re-checking space and state
const PRODUCER_PARK: Duration = Duration::from_millis(10);

/// Outcome of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Accepted,
    /// Buffer full under `IfPossible`
    Full,
    /// Queue is stopping or stopped
    Stopped,
}

pub(crate) struct Partition<T> {
    slots: ArrayQueue<T>,
    claimed: AtomicBool,
    /// Items drained since the balancer last sampled
    drained: AtomicU64,
    /// Producers currently inside `enqueue`
    in_flight: AtomicUsize,
    /// Producers parked on `not_full`
    waiters: AtomicUsize,
    park: Mutex<()>,
    not_full: Condvar,
}

impl<T> Partition<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: ArrayQueue::new(capacity),
            claimed: AtomicBool::new(false),
            drained: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            waiters: AtomicUsize::new(0),
            park: Mutex::new(()),
            not_full: Condvar::new(),
        }
    }

    /// Add an item according to `strategy`
    ///
    /// Never enqueues once `state` has left `Running`.
    pub(crate) fn enqueue(&self, item: T, strategy: BufferStrategy, state: &StateCell) -> Enqueue {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let outcome = self.enqueue_inner(item, strategy, state);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn enqueue_inner(&self, mut item: T, strategy: BufferStrategy, state: &StateCell) -> Enqueue {
        loop {
            if !state.is_running() {
                return Enqueue::Stopped;
            }
            match self.slots.push(item) {
                Ok(()) => return Enqueue::Accepted,
                Err(rejected) => item = rejected,
            }
            if strategy == BufferStrategy::IfPossible {
                return Enqueue::Full;
            }

            let mut guard = self.park.lock();
            self.waiters.fetch_add(1, Ordering::SeqCst);
            // Re-check after registering so a concurrent drain cannot be missed
            if self.slots.is_full() && state.is_running() {
                self.not_full.wait_for(&mut guard, PRODUCER_PARK);
            }
            self.waiters.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Try to take the exclusive drain claim
    pub(crate) fn try_claim(&self) -> Option<DrainClaim<'_, T>> {
        self.claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| DrainClaim { partition: self })
    }

    /// Dequeue without a claim
    ///
    /// Only for the final drain at shutdown, after every sweep has finished.
    pub(crate) fn drain_unclaimed(&self, max_items: usize) -> Vec<T> {
        self.pop_batch(max_items)
    }

    fn pop_batch(&self, max_items: usize) -> Vec<T> {
        let mut batch = Vec::with_capacity(max_items.min(self.slots.len()));
        while batch.len() < max_items {
            match self.slots.pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        if !batch.is_empty() && self.waiters.load(Ordering::SeqCst) > 0 {
            self.wake_producers();
        }
        batch
    }

    /// Wake every parked producer
    pub(crate) fn wake_producers(&self) {
        let _guard = self.park.lock();
        self.not_full.notify_all();
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    #[inline]
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn record_drained(&self, count: u64) {
        self.drained.fetch_add(count, Ordering::Relaxed);
    }

    /// Read and reset the drained counter
    #[inline]
    pub(crate) fn take_drained(&self) -> u64 {
        self.drained.swap(0, Ordering::Relaxed)
    }
}

/// Exclusive right to drain one partition, released on drop
pub(crate) struct DrainClaim<'a, T> {
    partition: &'a Partition<T>,
}

impl<T> DrainClaim<'_, T> {
    /// Remove up to `max_items` items in enqueue order
    pub(crate) fn dequeue_batch(&self, max_items: usize) -> Vec<T> {
        self.partition.pop_batch(max_items)
    }
}

impl<T> Drop for DrainClaim<'_, T> {
    fn drop(&mut self) {
        self.partition.claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "partition_test.rs"]
mod tests;
