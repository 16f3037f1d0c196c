//! Drain tasks
//!
//! A [`DrainTask`] is one scheduler job per task slot. Each run is one sweep:
//!
//! ```text
//! load topology ─► for p in owned(task):
//!                     claim p ─► dequeue ≤ max_batch ─► dispatch ─► release
//! data?  yes ─► gap = min_idle, run again now
//!        no, a claim was held elsewhere ─► run again after min_idle
//!        no  ─► on_idle(), run again after gap, gap = min(gap * 2, max_idle)
//! ```
//!
//! Ownership is re-read only here, at the start of a sweep.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::handler::TypeKeyed;
use crate::queue::QueueCore;
use crate::scheduler::{Job, Next};

thread_local! {
    /// Id of the queue whose sweep is running on this thread, 0 if none
    static SWEEPING: Cell<u64> = const { Cell::new(0) };
}

/// Id of the queue being swept on the calling thread, if any
pub(crate) fn sweeping_queue() -> Option<u64> {
    let id = SWEEPING.with(Cell::get);
    (id != 0).then_some(id)
}

/// Marks a sweep as active for shutdown's quiescence wait
struct SweepGuard<'a> {
    active: &'a AtomicUsize,
    previous: u64,
}

impl<'a> SweepGuard<'a> {
    /// None once the queue has left `Running`
    fn enter<T>(core: &'a QueueCore<T>) -> Option<Self> {
        core.active_sweeps.fetch_add(1, Ordering::SeqCst);
        if !core.state.is_running() {
            core.active_sweeps.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        let previous = SWEEPING.with(|cell| cell.replace(core.id));
        Some(Self {
            active: &core.active_sweeps,
            previous,
        })
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        SWEEPING.with(|cell| cell.set(self.previous));
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct DrainTask<T> {
    index: usize,
    core: Arc<QueueCore<T>>,
    /// Next idle gap in nanoseconds
    idle_gap: AtomicU64,
}

impl<T> DrainTask<T> {
    pub(crate) fn new(index: usize, core: Arc<QueueCore<T>>) -> Self {
        let idle_gap = AtomicU64::new(as_nanos(core.min_idle));
        Self {
            index,
            core,
            idle_gap,
        }
    }

    /// Gap the next idle sweep will wait
    pub(crate) fn current_idle_gap(&self) -> Duration {
        Duration::from_nanos(self.idle_gap.load(Ordering::Relaxed))
    }
}

/// Outcome of one sweep
#[derive(Debug, Default, Clone, Copy)]
struct Sweep {
    drained: usize,
    /// Owned partitions skipped because another task held the claim
    contended: usize,
}

impl<T: TypeKeyed> DrainTask<T> {
    /// Drain every owned partition once
    fn sweep(&self) -> Sweep {
        let core = &self.core;
        let topology = core.topology.load_full();

        let mut sweep = Sweep::default();
        for &index in topology.assignment.owned_by(self.index) {
            let partition = &topology.partitions[index];
            // Still held by a task on an older snapshot
            let Some(claim) = partition.try_claim() else {
                sweep.contended += 1;
                continue;
            };
            let batch = claim.dequeue_batch(core.max_batch);
            if batch.is_empty() {
                continue;
            }
            sweep.drained += batch.len();
            partition.record_drained(batch.len() as u64);
            core.registry.dispatch(&core.name, batch, &core.metrics);
        }
        sweep
    }
}

impl<T: TypeKeyed + Send + 'static> Job for DrainTask<T> {
    fn run(&self) -> Next {
        let Some(_guard) = SweepGuard::enter(&self.core) else {
            return Next::Done;
        };

        let sweep = self.sweep();
        if sweep.drained > 0 {
            self.idle_gap
                .store(as_nanos(self.core.min_idle), Ordering::Relaxed);
            return Next::After(Duration::ZERO);
        }
        // A hand-off is in progress; the partition may hold data
        if sweep.contended > 0 {
            tracing::trace!(
                queue = %self.core.name,
                task = self.index,
                contended = sweep.contended,
                "claims held elsewhere"
            );
            return Next::After(self.core.min_idle);
        }

        self.core.metrics.record_idle_sweep();
        self.core.registry.notify_idle(&self.core.name);

        let gap = self.current_idle_gap();
        let next = gap.saturating_mul(2).min(self.core.max_idle);
        self.idle_gap.store(as_nanos(next), Ordering::Relaxed);
        tracing::trace!(queue = %self.core.name, task = self.index, gap = ?gap, "idle sweep");
        Next::After(gap)
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "drain_test.rs"]
mod tests;
