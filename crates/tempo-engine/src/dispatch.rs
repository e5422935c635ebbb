//! The dispatch loop: extract due events, execute, settle, notify.
//!
//! Each cycle:
//!
//! 1. Apply inserts waiting in the deferred channel.
//! 2. Read the clock once; that reading is "now" for the whole batch.
//! 3. Extract every due event from the queue.
//! 4. For each: re-validate under the queue lock (`begin_execution`),
//!    skipping events cancelled or delayed since extraction; run the
//!    action with no lock held, catching errors and panics; settle the
//!    outcome (`finish_execution`); notify fire observers.
//!
//! [`Scheduler::dispatch_due`] runs one cycle and returns, for lockstep
//! drivers and virtual-time tests. [`Scheduler::run`] loops until a
//! [`StopSignal`] fires, sleeping on the queue condvar between cycles.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tempo_core::FaultKind;
use tracing::{error, info, trace, warn};

use crate::action::ExecutionContext;
use crate::metrics::bump;
use crate::queue::{DueEvent, Finish};
use crate::scheduler::{Scheduler, SchedulerShared};
use crate::telemetry::{FireOutcome, FiredNotice};

/// Tally of one dispatch cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Deferred inserts applied (successfully) at the start of the cycle.
    pub deferred_applied: usize,
    /// Events extracted as due.
    pub extracted: usize,
    /// Actions run.
    pub executed: usize,
    /// Extracted events skipped (cancelled or delayed in the meantime).
    pub skipped: usize,
    /// Repeating events queued again.
    pub rescheduled: usize,
    /// Actions that returned an error or panicked.
    pub faulted: usize,
}

/// Cooperative stop request for [`Scheduler::run`].
///
/// Triggering is permanent: the scheduler refuses new events afterwards.
#[derive(Clone)]
pub struct StopSignal {
    shared: Arc<SchedulerShared>,
}

impl StopSignal {
    /// Request the dispatch loop to exit after its current batch.
    pub fn trigger(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.queue.wake();
    }

    /// Whether [`trigger`](Self::trigger) has been called.
    pub fn is_triggered(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }
}

impl Scheduler {
    /// A stop signal bound to this scheduler.
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            shared: Arc::clone(self.shared()),
        }
    }

    /// Run one dispatch cycle at the clock's current time.
    pub fn dispatch_due(&self) -> DispatchReport {
        let started = Instant::now();
        let shared = self.shared();
        let mut report = DispatchReport {
            deferred_applied: self.apply_deferred(),
            ..DispatchReport::default()
        };

        let now = shared.clock.now();
        let batch = shared.queue.extract_due(now);
        report.extracted = batch.len();
        for due in batch {
            self.fire(due, now, &mut report);
        }

        let cycle_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        shared.counters.record_cycle(report.extracted, cycle_us);
        report
    }

    /// Run dispatch cycles until `stop` is triggered.
    ///
    /// Between cycles the loop sleeps until the next due time, capped by
    /// [`max_idle_wait`](crate::config::SchedulerConfig::max_idle_wait).
    /// Inserts, deferred inserts, and the stop signal wake it early.
    /// A `stop` obtained from a different scheduler is still honoured, but
    /// only noticed at the idle-wait cadence.
    pub fn run(&self, stop: &StopSignal) {
        let shared = self.shared();
        let max_wait = shared.config.max_idle_wait;
        info!(?max_wait, "dispatch loop started");
        loop {
            if stop.is_triggered() || self.is_stopping() {
                break;
            }
            self.dispatch_due();
            shared.queue.wait_for_work(&*shared.clock, max_wait, || {
                stop.is_triggered()
                    || shared.stopping.load(Ordering::Acquire)
                    || !shared.deferred_rx.is_empty()
            });
        }
        info!(pending = shared.queue.len(), "dispatch loop stopped");
    }

    fn apply_deferred(&self) -> usize {
        let shared = self.shared();
        let mut applied = 0;
        while let Ok(insert) = shared.deferred_rx.try_recv() {
            match self.enqueue(&insert.event, insert.fire_at) {
                Ok(()) => applied += 1,
                Err(e) => {
                    bump(&shared.counters.deferred_rejections);
                    warn!(
                        event_id = %insert.event.id(),
                        kind = %insert.event.kind(),
                        error = %e,
                        "deferred insert rejected"
                    );
                }
            }
        }
        applied
    }

    fn fire(&self, due: DueEvent, now: Instant, report: &mut DispatchReport) {
        let shared = self.shared();
        let DueEvent { event, fire_at } = due;
        let id = event.id();

        if !shared.queue.begin_execution(id) {
            report.skipped += 1;
            bump(&shared.counters.skipped);
            trace!(event_id = %id, "skipped: no longer scheduled");
            return;
        }
        bump(&shared.counters.fired);
        report.executed += 1;

        let ctx = ExecutionContext::new(self, &event, now, fire_at);
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| event.execute(&ctx)));
        let execution_time = started.elapsed();

        let fault = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(FaultKind::from(e)),
            Err(payload) => Some(FaultKind::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        };
        if let Some(fault) = &fault {
            report.faulted += 1;
            bump(&shared.counters.faulted);
            error!(event_id = %id, kind = %event.kind(), error = %fault, "event execution faulted");
        }

        let outcome = match shared.queue.finish_execution(id, now, fault.as_ref()) {
            Finish::Rescheduled { fire_at } => {
                report.rescheduled += 1;
                bump(&shared.counters.repeats);
                FireOutcome::Rescheduled {
                    next_fire_at: fire_at,
                }
            }
            Finish::Completed => {
                if let Some(requestor) = event.requestor() {
                    shared.index.remove(requestor, id);
                }
                bump(&shared.counters.completed);
                match fault {
                    Some(fault) => FireOutcome::Faulted(fault),
                    None => FireOutcome::Completed,
                }
            }
            // The cancel path already cleaned up the index.
            Finish::Cancelled => FireOutcome::CancelledDuringRun,
        };

        let notice = FiredNotice {
            event,
            queue_size: shared.queue.len(),
            latency: now.saturating_duration_since(fire_at),
            execution_time,
            outcome,
        };
        trace!(
            event_id = %id,
            kind = %notice.event.kind(),
            latency = ?notice.latency,
            outcome = ?notice.outcome,
            "event fired"
        );
        let observers = shared.observers.read().clone();
        for observer in &observers {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| observer.on_fired(&notice)));
            if let Err(payload) = delivered {
                error!(
                    event_id = %id,
                    kind = %notice.event.kind(),
                    panic = %panic_message(payload.as_ref()),
                    "fire observer panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
