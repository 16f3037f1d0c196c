//! Throughput-weighted drain balancing
//!
//! # Algorithm
//!
//! ```text
//! rates[p]  = items drained from p / interval
//! 1. LPT:     hottest partition first, each to the least-loaded task
//!             (ties: fewer partitions, then lower index)
//! 2. Gate:    keep the current assignment unless LPT lowers the busiest
//!             task's load by at least `min_gain`
//! 3. Relabel: match LPT groups to current tasks by shared load so that
//!             as few partitions as possible change owner
//! ```
//!
//! The gate makes the balancer idempotent under steady load: once the
//! published assignment is the LPT assignment, the next run finds no gain.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{BatchQueueError, Result};

/// Default minimum relative reduction of the busiest task's load
pub const DEFAULT_MIN_GAIN: f64 = 0.10;

/// Strategy for recomputing partition ownership from observed throughput
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrainBalancer {
    kind: BalancerKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BalancerKind {
    ThroughputWeighted { min_gain: f64 },
}

impl DrainBalancer {
    /// Equalize per-task drain rate, moving only for a 10% or better gain
    pub fn throughput_weighted() -> Self {
        Self {
            kind: BalancerKind::ThroughputWeighted {
                min_gain: DEFAULT_MIN_GAIN,
            },
        }
    }

    /// [`throughput_weighted`](Self::throughput_weighted) with a custom gain threshold in `[0, 1)`
    pub fn throughput_weighted_with(min_gain: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&min_gain) {
            return Err(BatchQueueError::invalid(
                "balancer",
                format!("min gain must be in [0, 1), got {min_gain}"),
            ));
        }
        Ok(Self {
            kind: BalancerKind::ThroughputWeighted { min_gain },
        })
    }

    /// Compute a new owner per partition, or None to keep the current one
    ///
    /// `rates[p]` is the observed drain rate of partition `p` and
    /// `owners[p]` its current task. A returned assignment covers every
    /// partition and leaves no task empty.
    pub fn assign(&self, rates: &[f64], owners: &[usize], task_count: usize) -> Option<Vec<usize>> {
        let BalancerKind::ThroughputWeighted { min_gain } = self.kind;

        let partition_count = rates.len();
        if task_count <= 1 || partition_count < task_count || owners.len() != partition_count {
            return None;
        }
        if owners.iter().any(|&t| t >= task_count) {
            return None;
        }
        let total: f64 = rates.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return None;
        }

        let current_max = max_load(&task_loads(rates, owners, task_count));
        let groups = lpt(rates, task_count);
        let proposed_max = max_load(&task_loads(rates, &groups, task_count));

        if proposed_max >= current_max * (1.0 - min_gain) {
            return None;
        }

        let labels = relabel(rates, owners, &groups, task_count);
        let assigned: Vec<usize> = groups.iter().map(|&g| labels[g]).collect();
        if assigned == owners {
            return None;
        }
        Some(assigned)
    }
}

impl fmt::Display for DrainBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let BalancerKind::ThroughputWeighted { min_gain } = self.kind;
        write!(f, "throughput_weighted(min_gain={min_gain})")
    }
}

fn task_loads(rates: &[f64], owners: &[usize], task_count: usize) -> Vec<f64> {
    let mut loads = vec![0.0; task_count];
    for (p, &task) in owners.iter().enumerate() {
        loads[task] += rates[p];
    }
    loads
}

fn max_load(loads: &[f64]) -> f64 {
    loads.iter().copied().fold(0.0, f64::max)
}

/// Longest-processing-time-first grouping; returns group per partition
fn lpt(rates: &[f64], task_count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rates.len()).collect();
    order.sort_by(|&a, &b| {
        rates[b]
            .partial_cmp(&rates[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut loads = vec![0.0_f64; task_count];
    let mut counts = vec![0_usize; task_count];
    let mut groups = vec![0; rates.len()];

    for p in order {
        let target = (0..task_count)
            .min_by(|&a, &b| {
                loads[a]
                    .partial_cmp(&loads[b])
                    .unwrap_or(Ordering::Equal)
                    .then(counts[a].cmp(&counts[b]))
                    .then(a.cmp(&b))
            })
            .unwrap_or(0);
        loads[target] += rates[p];
        counts[target] += 1;
        groups[p] = target;
    }
    groups
}

/// Map each LPT group to a current task, greedily by shared weight
fn relabel(rates: &[f64], owners: &[usize], groups: &[usize], task_count: usize) -> Vec<usize> {
    // Weight every partition by at least 1 so idle partitions still count
    let mut overlap = vec![vec![0.0_f64; task_count]; task_count];
    for (p, (&owner, &group)) in owners.iter().zip(groups).enumerate() {
        overlap[group][owner] += rates[p] + 1.0;
    }

    let mut pairs: Vec<(f64, usize, usize)> = Vec::with_capacity(task_count * task_count);
    for (group, row) in overlap.iter().enumerate() {
        for (task, &weight) in row.iter().enumerate() {
            if weight > 0.0 {
                pairs.push((weight, group, task));
            }
        }
    }
    pairs.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut labels = vec![usize::MAX; task_count];
    let mut taken = vec![false; task_count];
    for (_, group, task) in pairs {
        if labels[group] == usize::MAX && !taken[task] {
            labels[group] = task;
            taken[task] = true;
        }
    }

    let mut free = (0..task_count).filter(|&t| !taken[t]);
    for label in labels.iter_mut().filter(|l| **l == usize::MAX) {
        *label = free.next().unwrap_or(0);
    }
    labels
}

#[cfg(test)]
#[path = "balancer_test.rs"]
mod tests;
