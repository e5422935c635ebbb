//! The work an event performs when it fires.
//!
//! An [`Action`] is invoked by the dispatch loop with an
//! [`ExecutionContext`] describing the firing. Plain closures implement
//! the trait, so most callers never name it:
//!
//! ```ignore
//! let event = Event::builder(|ctx| {
//!     tracing::info!(late_by = ?ctx.latency(), "regen tick");
//!     Ok(())
//! })
//! .build();
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempo_core::ActionError;

use crate::event::Event;
use crate::scheduler::Scheduler;

/// Work executed when an event fires.
///
/// Runs on the dispatch thread. Must not block for long: every other due
/// event waits behind it. Returning `Err` (or panicking) faults the
/// firing; the event is forced to `Completed` even if it repeats.
pub trait Action: Send + Sync {
    /// Perform the event's work.
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<(), ActionError>;
}

impl<F> Action for F
where
    F: Fn(&ExecutionContext<'_>) -> Result<(), ActionError> + Send + Sync,
{
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<(), ActionError> {
        self(ctx)
    }
}

/// Everything an action may want to know about the current firing.
///
/// Borrowed for the duration of [`Action::execute`]. The scheduler handle
/// lets an action schedule follow-up events or cancel itself; those calls
/// are safe from inside an action because the dispatch loop holds no lock
/// while executing.
pub struct ExecutionContext<'a> {
    scheduler: &'a Scheduler,
    event: &'a Arc<Event>,
    now: Instant,
    fire_at: Instant,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        scheduler: &'a Scheduler,
        event: &'a Arc<Event>,
        now: Instant,
        fire_at: Instant,
    ) -> Self {
        Self {
            scheduler,
            event,
            now,
            fire_at,
        }
    }

    /// The dispatch cycle's notion of "now" (read once per cycle).
    pub fn now(&self) -> Instant {
        self.now
    }

    /// The instant this firing was due.
    pub fn scheduled_for(&self) -> Instant {
        self.fire_at
    }

    /// How late this firing is relative to its due time.
    pub fn latency(&self) -> Duration {
        self.now.saturating_duration_since(self.fire_at)
    }

    /// The firing event.
    pub fn event(&self) -> &Arc<Event> {
        self.event
    }

    /// 1-based ordinal of this firing (repeating events fire many times).
    pub fn fire_count(&self) -> u64 {
        self.event.fire_count()
    }

    /// Handle to the scheduler running this event.
    pub fn scheduler(&self) -> &Scheduler {
        self.scheduler
    }

    /// Cancel the firing event's future repeats.
    ///
    /// Returns `false` for a non-repeating or non-cancellable event: a
    /// one-shot that is already executing has nothing left to cancel.
    pub fn cancel_repeats(&self) -> bool {
        self.scheduler.cancel_event(self.event)
    }
}
