//! Point-in-time buffer usage
//!
//! [`BatchQueueStats`] copies per-partition sizes once; later produce and
//! drain activity never changes a taken snapshot.

/// Immutable snapshot of partition usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQueueStats {
    buffer_size: usize,
    used: Vec<usize>,
}

/// Usage of one partition, as ranked by [`BatchQueueStats::top_n`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionUsage {
    pub partition_index: usize,
    pub used: usize,
    pub used_percentage: f64,
}

impl BatchQueueStats {
    pub(crate) fn new(buffer_size: usize, used: Vec<usize>) -> Self {
        Self { buffer_size, used }
    }

    #[inline]
    pub fn partition_count(&self) -> usize {
        self.used.len()
    }

    /// Capacity of each partition
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn total_used(&self) -> usize {
        self.used.iter().sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.buffer_size.saturating_mul(self.used.len())
    }

    /// Overall fill level in percent, 0.0 when there is no capacity
    pub fn total_used_percentage(&self) -> f64 {
        percentage(self.total_used(), self.total_capacity())
    }

    /// Items in partition `index`, 0 when out of range
    pub fn partition_used(&self, index: usize) -> usize {
        self.used.get(index).copied().unwrap_or(0)
    }

    pub fn partition_used_percentage(&self, index: usize) -> f64 {
        percentage(self.partition_used(index), self.buffer_size)
    }

    /// The `n` fullest partitions, descending, lower index first on ties
    pub fn top_n(&self, n: usize) -> Vec<PartitionUsage> {
        let mut ranked: Vec<usize> = (0..self.used.len()).collect();
        ranked.sort_by(|&a, &b| self.used[b].cmp(&self.used[a]).then(a.cmp(&b)));
        ranked
            .into_iter()
            .take(n)
            .map(|index| PartitionUsage {
                partition_index: index,
                used: self.used[index],
                used_percentage: self.partition_used_percentage(index),
            })
            .collect()
    }

    pub(crate) fn into_parts(self) -> (usize, Vec<usize>) {
        (self.buffer_size, self.used)
    }
}

fn percentage(used: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        0.0
    } else {
        used as f64 * 100.0 / capacity as f64
    }
}
