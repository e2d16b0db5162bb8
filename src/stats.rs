// edgert: Per-task execution statistics
// Atomic counters updated by the owning thread once per job, readable from
// any thread without locking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Execution-time accumulator for one task.
pub struct ExecStats {
    sum_ns: AtomicU64,
    count: AtomicU64,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
    deadline_misses: AtomicU64,
}

impl ExecStats {
    pub fn new() -> Self {
        Self {
            sum_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
            deadline_misses: AtomicU64::new(0),
        }
    }

    /// Record one completed job.
    #[inline]
    pub(crate) fn record(&self, exec_ns: u64) {
        self.sum_ns.fetch_add(exec_ns, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.min_ns.fetch_min(exec_ns, Ordering::Relaxed);
        self.max_ns.fetch_max(exec_ns, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deadline_miss(&self) {
        self.deadline_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough snapshot for reporting; counters are updated by the
    /// owning thread between jobs, so field skew is bounded by one job.
    pub fn snapshot(&self) -> ExecSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        ExecSnapshot {
            count,
            sum_ns: self.sum_ns.load(Ordering::Relaxed),
            min_ns: if count == 0 {
                0
            } else {
                self.min_ns.load(Ordering::Relaxed)
            },
            max_ns: self.max_ns.load(Ordering::Relaxed),
            deadline_misses: self.deadline_misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ExecStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a task's accumulated statistics. `min_ns` and
/// `max_ns` are zero before the first job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecSnapshot {
    pub count: u64,
    pub sum_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub deadline_misses: u64,
}

impl ExecSnapshot {
    /// Mean execution time in nanoseconds, zero before the first job.
    pub fn mean_ns(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum_ns / self.count
        }
    }
}
