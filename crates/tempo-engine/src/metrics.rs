//! Scheduler counters.
//!
//! [`SchedulerMetrics`] is a point-in-time snapshot of cumulative
//! counters maintained by the scheduler, plus the shape of the most
//! recent dispatch cycle. Counters are relaxed atomics: a snapshot taken
//! while the dispatch loop runs may be mid-update across fields.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of scheduler counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Events accepted into the queue.
    pub scheduled: u64,
    /// Executions started.
    pub fired: u64,
    /// Repeating events placed back in the queue after firing.
    pub repeats: u64,
    /// Events that reached `Completed` (including faulted ones).
    pub completed: u64,
    /// Successful cancels.
    pub cancelled: u64,
    /// Successful expedites.
    pub expedited: u64,
    /// Successful delays.
    pub delayed: u64,
    /// Executions that returned an error or panicked.
    pub faulted: u64,
    /// Extracted events skipped because they were cancelled or delayed
    /// before execution began.
    pub skipped: u64,
    /// Deferred inserts dropped when applied (queue full).
    pub deferred_rejections: u64,
    /// Dispatch cycles run.
    pub dispatch_cycles: u64,
    /// Events extracted by the most recent cycle.
    pub last_batch_size: u64,
    /// Wall-clock duration of the most recent cycle, in microseconds.
    pub last_cycle_us: u64,
}

#[derive(Default)]
pub(crate) struct MetricCounters {
    pub(crate) scheduled: AtomicU64,
    pub(crate) fired: AtomicU64,
    pub(crate) repeats: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) cancelled: AtomicU64,
    pub(crate) expedited: AtomicU64,
    pub(crate) delayed: AtomicU64,
    pub(crate) faulted: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) deferred_rejections: AtomicU64,
    pub(crate) dispatch_cycles: AtomicU64,
    pub(crate) last_batch_size: AtomicU64,
    pub(crate) last_cycle_us: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl MetricCounters {
    pub(crate) fn record_cycle(&self, batch: usize, cycle_us: u64) {
        bump(&self.dispatch_cycles);
        self.last_batch_size.store(batch as u64, Ordering::Relaxed);
        self.last_cycle_us.store(cycle_us, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerMetrics {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SchedulerMetrics {
            scheduled: get(&self.scheduled),
            fired: get(&self.fired),
            repeats: get(&self.repeats),
            completed: get(&self.completed),
            cancelled: get(&self.cancelled),
            expedited: get(&self.expedited),
            delayed: get(&self.delayed),
            faulted: get(&self.faulted),
            skipped: get(&self.skipped),
            deferred_rejections: get(&self.deferred_rejections),
            dispatch_cycles: get(&self.dispatch_cycles),
            last_batch_size: get(&self.last_batch_size),
            last_cycle_us: get(&self.last_cycle_us),
        }
    }
}
