//! Partition arena and partition-to-task assignment
//!
//! A [`Topology`] is immutable once published. Growth and rebalancing build
//! a new one and swap it in whole, so a drain task that loads it at the
//! start of a sweep always sees a complete, consistent assignment.

use std::sync::Arc;

use crate::partition::Partition;

/// Partition ownership: every partition has exactly one owning task and
/// every task owns at least one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Assignment {
    /// partition -> task
    owners: Vec<usize>,
    /// task -> partitions, ascending
    by_task: Vec<Vec<usize>>,
}

impl Assignment {
    /// Partition `p` goes to task `p % task_count`
    pub(crate) fn round_robin(partition_count: usize, task_count: usize) -> Self {
        debug_assert!(task_count >= 1 && partition_count >= task_count);
        let owners = (0..partition_count).map(|p| p % task_count).collect();
        Self::from_owners(owners, task_count)
    }

    pub(crate) fn from_owners(owners: Vec<usize>, task_count: usize) -> Self {
        let mut by_task = vec![Vec::new(); task_count];
        for (partition, &task) in owners.iter().enumerate() {
            by_task[task].push(partition);
        }
        Self { owners, by_task }
    }

    /// Extend to `partition_count` partitions, keeping existing owners
    ///
    /// New partitions are dealt round-robin by index.
    pub(crate) fn grow(&self, partition_count: usize) -> Self {
        let task_count = self.task_count();
        let mut owners = self.owners.clone();
        owners.extend((owners.len()..partition_count).map(|p| p % task_count));
        Self::from_owners(owners, task_count)
    }

    #[inline]
    pub(crate) fn owners(&self) -> &[usize] {
        &self.owners
    }

    #[inline]
    pub(crate) fn owned_by(&self, task: usize) -> &[usize] {
        self.by_task.get(task).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub(crate) fn task_count(&self) -> usize {
        self.by_task.len()
    }

    #[inline]
    pub(crate) fn partition_count(&self) -> usize {
        self.owners.len()
    }

    pub(crate) fn task_sets(&self) -> Vec<Vec<usize>> {
        self.by_task.clone()
    }

    /// Partitions whose owner differs from `other`
    pub(crate) fn moved_from(&self, other: &Assignment) -> usize {
        self.owners
            .iter()
            .zip(&other.owners)
            .filter(|(a, b)| a != b)
            .count()
    }

    /// Disjoint, covering, and every task non-empty
    pub(crate) fn is_valid(&self) -> bool {
        let covered: usize = self.by_task.iter().map(Vec::len).sum();
        covered == self.owners.len()
            && self.by_task.iter().all(|set| !set.is_empty())
            && self.owners.iter().all(|&task| task < self.by_task.len())
    }
}

/// Published partitions plus their owners
pub(crate) struct Topology<T> {
    pub(crate) partitions: Vec<Arc<Partition<T>>>,
    pub(crate) assignment: Assignment,
}

impl<T> Topology<T> {
    pub(crate) fn new(partition_count: usize, task_count: usize, capacity: usize) -> Self {
        Self {
            partitions: (0..partition_count)
                .map(|_| Arc::new(Partition::new(capacity)))
                .collect(),
            assignment: Assignment::round_robin(partition_count, task_count),
        }
    }

    /// Append partitions up to `partition_count`; existing ones are shared
    pub(crate) fn grown(&self, partition_count: usize, capacity: usize) -> Self {
        let mut partitions = self.partitions.clone();
        partitions.extend(
            (self.partitions.len()..partition_count).map(|_| Arc::new(Partition::new(capacity))),
        );
        Self {
            partitions,
            assignment: self.assignment.grow(partition_count),
        }
    }

    /// Same partitions under a different assignment
    pub(crate) fn reassigned(&self, assignment: Assignment) -> Self {
        debug_assert_eq!(assignment.partition_count(), self.partitions.len());
        Self {
            partitions: self.partitions.clone(),
            assignment,
        }
    }

    #[inline]
    pub(crate) fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

#[cfg(test)]
#[path = "topology_test.rs"]
mod tests;
