//! Worker pool for drain tasks
//!
//! A [`Scheduler`] is a fixed set of named OS threads serving a delay queue
//! of re-schedulable jobs. A job runs one step and says when it wants to run
//! again, so an idle drain task costs a heap entry instead of a parked
//! thread, and many queues can share one pool.
//!
//! ```text
//!   schedule(job, delay) ──► BinaryHeap<(due, seq)> ──► worker-0 ─┐
//!                                 ▲                    worker-1 ─┼─ job.run()
//!                                 └──── Next::After(d) ◄─────────┘
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{BatchQueueError, Result, panic_message};

/// Delay before re-running a job that panicked
const PANIC_RETRY: Duration = Duration::from_millis(100);

/// What a job wants after one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    After(Duration),
    Done,
}

pub(crate) trait Job: Send + Sync {
    fn run(&self) -> Next;
}

struct Entry {
    due: Instant,
    seq: u64,
    job: Arc<dyn Job>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

struct Timeline {
    entries: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    running: bool,
}

impl Timeline {
    fn push(&mut self, job: Arc<dyn Job>, due: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Reverse(Entry { due, seq, job }));
    }
}

struct Shared {
    timeline: Mutex<Timeline>,
    available: Condvar,
}

/// Named pool of drain threads
pub(crate) struct Scheduler {
    name: String,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    thread_count: usize,
}

impl Scheduler {
    /// Start `thread_count` workers named `{name}-{i}`
    pub(crate) fn new(name: impl Into<String>, thread_count: usize) -> Result<Self> {
        let name = name.into();
        let shared = Arc::new(Shared {
            timeline: Mutex::new(Timeline {
                entries: BinaryHeap::new(),
                next_seq: 0,
                running: true,
            }),
            available: Condvar::new(),
        });

        let scheduler = Self {
            name,
            shared,
            workers: Mutex::new(Vec::with_capacity(thread_count)),
            thread_count,
        };

        for i in 0..thread_count {
            let thread_name = format!("{}-{}", scheduler.name, i);
            let shared = Arc::clone(&scheduler.shared);
            let spawned = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => scheduler.workers.lock().push(handle),
                Err(source) => {
                    scheduler.shutdown();
                    return Err(BatchQueueError::spawn(thread_name, source));
                }
            }
        }

        tracing::debug!(pool = %scheduler.name, threads = thread_count, "scheduler started");
        Ok(scheduler)
    }

    /// Queue `job` to run after `delay`
    pub(crate) fn schedule(&self, job: Arc<dyn Job>, delay: Duration) {
        let mut timeline = self.shared.timeline.lock();
        if !timeline.running {
            return;
        }
        timeline.push(job, Instant::now() + delay);
        self.shared.available.notify_one();
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.thread_count
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.shared.timeline.lock().running
    }

    /// Stop workers and drop pending jobs
    ///
    /// Joins every worker except the calling thread, so a job may stop its
    /// own pool.
    pub(crate) fn shutdown(&self) {
        {
            let mut timeline = self.shared.timeline.lock();
            if !timeline.running {
                return;
            }
            timeline.running = false;
            timeline.entries.clear();
            self.shared.available.notify_all();
        }

        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!(pool = %self.name, "scheduler worker panicked");
            }
        }
        tracing::debug!(pool = %self.name, "scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    let mut timeline = shared.timeline.lock();
    loop {
        if !timeline.running {
            return;
        }

        let now = Instant::now();
        let due = timeline.entries.peek().map(|Reverse(entry)| entry.due);
        match due {
            None => {
                shared.available.wait(&mut timeline);
            }
            Some(due) if due > now => {
                shared.available.wait_until(&mut timeline, due);
            }
            Some(_) => {
                let Some(Reverse(entry)) = timeline.entries.pop() else {
                    continue;
                };
                let next = MutexGuard::unlocked(&mut timeline, || run_job(entry.job.as_ref()));
                if let Next::After(delay) = next
                    && timeline.running
                {
                    timeline.push(entry.job, Instant::now() + delay);
                }
            }
        }
    }
}

fn run_job(job: &dyn Job) -> Next {
    match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
        Ok(next) => next,
        Err(payload) => {
            tracing::error!(
                error = %panic_message(payload.as_ref()),
                "drain job panicked, rescheduling"
            );
            Next::After(PANIC_RETRY)
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
