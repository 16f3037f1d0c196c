//! Sizing policies
//!
//! Closed sets of variants built through validating constructors. Every
//! `resolve` is a total function returning at least 1.

use std::fmt;

use crate::error::{BatchQueueError, Result};

/// Default multiplier for [`PartitionPolicy::adaptive`]
pub const DEFAULT_ADAPTIVE_MULTIPLIER: usize = 25;

/// Number of logical CPUs, falling back to 4 when unknown
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

// ============================================================================
// ThreadPolicy
// ============================================================================

/// How many drain threads a queue (or shared pool) wants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreadPolicy {
    kind: ThreadKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ThreadKind {
    Fixed(usize),
    CpuCores { base: usize, multiplier: f64 },
}

impl ThreadPolicy {
    /// Exactly `n` threads
    pub fn fixed(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(BatchQueueError::invalid("threads", "fixed count must be > 0"));
        }
        Ok(Self {
            kind: ThreadKind::Fixed(n),
        })
    }

    /// `round(multiplier * cpus)` threads, at least 1
    pub fn cpu_cores(multiplier: f64) -> Result<Self> {
        Self::cpu_cores_with_base(0, multiplier)
    }

    /// `base + round(multiplier * cpus)` threads, at least 1
    pub fn cpu_cores_with_base(base: usize, multiplier: f64) -> Result<Self> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(BatchQueueError::invalid(
                "threads",
                format!("cpu multiplier must be a positive number, got {multiplier}"),
            ));
        }
        Ok(Self {
            kind: ThreadKind::CpuCores { base, multiplier },
        })
    }

    /// Resolve against the CPUs of this machine
    pub fn resolve(&self) -> usize {
        self.resolve_with(available_cpus())
    }

    /// Resolve against an explicit CPU count
    pub fn resolve_with(&self, cpus: usize) -> usize {
        match self.kind {
            ThreadKind::Fixed(n) => n,
            ThreadKind::CpuCores { base, multiplier } => {
                let scaled = (multiplier * cpus as f64).round() as usize;
                base.saturating_add(scaled).max(1)
            }
        }
    }
}

impl fmt::Display for ThreadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ThreadKind::Fixed(n) => write!(f, "fixed({n})"),
            ThreadKind::CpuCores { base: 0, multiplier } => write!(f, "cpu_cores({multiplier})"),
            ThreadKind::CpuCores { base, multiplier } => {
                write!(f, "cpu_cores_with_base({base}, {multiplier})")
            }
        }
    }
}

// ============================================================================
// PartitionPolicy
// ============================================================================

/// How many partitions a queue wants, given its thread and handler counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPolicy {
    kind: PartitionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartitionKind {
    Fixed(usize),
    ThreadMultiply(usize),
    Adaptive(usize),
}

impl PartitionPolicy {
    /// Exactly `n` partitions regardless of inputs
    pub fn fixed(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(BatchQueueError::invalid("partitions", "fixed count must be > 0"));
        }
        Ok(Self {
            kind: PartitionKind::Fixed(n),
        })
    }

    /// `fixed(n)` with `n` raised to at least 1
    pub(crate) fn fixed_clamped(n: usize) -> Self {
        Self {
            kind: PartitionKind::Fixed(n.max(1)),
        }
    }

    /// `k` partitions per thread
    pub fn thread_multiply(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(BatchQueueError::invalid(
                "partitions",
                "thread multiplier must be > 0",
            ));
        }
        Ok(Self {
            kind: PartitionKind::ThreadMultiply(k),
        })
    }

    /// One partition per handler up to `threads * 25`, then one per two handlers
    pub fn adaptive() -> Self {
        Self {
            kind: PartitionKind::Adaptive(DEFAULT_ADAPTIVE_MULTIPLIER),
        }
    }

    /// [`adaptive`](Self::adaptive) with a custom per-thread threshold
    pub fn adaptive_with(multiplier: usize) -> Result<Self> {
        if multiplier == 0 {
            return Err(BatchQueueError::invalid(
                "partitions",
                "adaptive multiplier must be > 0",
            ));
        }
        Ok(Self {
            kind: PartitionKind::Adaptive(multiplier),
        })
    }

    /// Whether handler registration can grow the partition count
    pub fn is_adaptive(&self) -> bool {
        matches!(self.kind, PartitionKind::Adaptive(_))
    }

    /// Resolve the partition count
    pub fn resolve(&self, thread_count: usize, handler_count: usize) -> usize {
        let resolved = match self.kind {
            PartitionKind::Fixed(n) => n,
            PartitionKind::ThreadMultiply(k) => k.saturating_mul(thread_count),
            PartitionKind::Adaptive(multiplier) => {
                let threshold = thread_count.saturating_mul(multiplier);
                if handler_count == 0 {
                    thread_count
                } else if handler_count <= threshold {
                    handler_count
                } else {
                    threshold + (handler_count - threshold) / 2
                }
            }
        };
        resolved.max(1)
    }
}

impl fmt::Display for PartitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PartitionKind::Fixed(n) => write!(f, "fixed({n})"),
            PartitionKind::ThreadMultiply(k) => write!(f, "thread_multiply({k})"),
            PartitionKind::Adaptive(m) => write!(f, "adaptive({m})"),
        }
    }
}

// ============================================================================
// BufferStrategy
// ============================================================================

/// Producer behavior when the target partition is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStrategy {
    /// Drop the item and return `false` immediately
    IfPossible,
    /// Wait for space, or until the queue stops
    #[default]
    Blocking,
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod tests;
