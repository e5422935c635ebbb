//! Schedulable events and their lifecycle notices.
//!
//! An [`Event`] is built once, shared as `Arc<Event>`, and handed to a
//! [`Scheduler`]. Its identity (id, kind, requestor, repeat interval) is
//! immutable. Its [`EventState`] is only ever written by the event queue
//! while holding the queue lock, so every observer sees a transition
//! sequence that respects [`EventState::can_transition`].
//!
//! Subscribers receive [`EventNotice`]s over a crossbeam channel. Notices
//! are emitted under the same lock as the transition they describe, so a
//! subscriber never sees `Completed` before `Fired`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tempo_core::{ActionError, EventId, EventKind, EventState, FaultKind, RequestorId};

use crate::action::{Action, ExecutionContext};
use crate::scheduler::{Scheduler, SchedulerShared};

// ── EventNotice ──────────────────────────────────────────────────

/// Lifecycle notice delivered to [`Event::subscribe`] receivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventNotice {
    /// Entered the queue (initially, or again after a repeat).
    Scheduled {
        /// When the event is now due.
        fire_at: Instant,
    },
    /// Moved earlier by an expedite.
    Expedited {
        /// The new due time.
        fire_at: Instant,
    },
    /// Moved later by a delay.
    Delayed {
        /// The new due time.
        fire_at: Instant,
    },
    /// Execution started.
    Fired {
        /// 1-based firing ordinal.
        fire_count: u64,
    },
    /// Terminal: finished normally.
    Completed,
    /// Terminal: cancelled before (or between) executions.
    Cancelled,
    /// Terminal: the action failed or panicked; the event is `Completed`.
    Faulted(FaultKind),
}

impl EventNotice {
    /// Whether no further notices follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Faulted(_))
    }
}

struct Subscribers {
    senders: SmallVec<[Sender<EventNotice>; 2]>,
    /// The terminal notice, once sent. Late subscribers get a copy.
    closed: Option<EventNotice>,
}

// ── Event ────────────────────────────────────────────────────────

/// A unit of future work with identity, owner, and lifecycle state.
pub struct Event {
    id: EventId,
    kind: EventKind,
    requestor: Option<RequestorId>,
    cancellable: bool,
    repeat_every: Option<Duration>,
    action: Box<dyn Action>,
    state: AtomicU8,
    fire_count: AtomicU64,
    /// Set by the scheduling call that wins the right to enqueue this
    /// event. Cleared again if that call fails.
    claimed: AtomicBool,
    owner: OnceLock<Weak<SchedulerShared>>,
    subscribers: Mutex<Subscribers>,
}

impl Event {
    /// Start building an event around a closure.
    pub fn builder<F>(action: F) -> EventBuilder
    where
        F: Fn(&ExecutionContext<'_>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        EventBuilder::with_action(action)
    }

    /// Unique identifier, assigned at construction.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Category tag used for filtering and telemetry.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Owning requestor, if any.
    pub fn requestor(&self) -> Option<RequestorId> {
        self.requestor
    }

    /// Whether cancel requests are honoured.
    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Repeat interval; `None` for a one-shot.
    pub fn repeat_every(&self) -> Option<Duration> {
        self.repeat_every
    }

    /// Whether the event re-enters the queue after each firing.
    pub fn is_repeating(&self) -> bool {
        self.repeat_every.is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EventState {
        EventState::from_u8(self.state.load(Ordering::Acquire))
            .expect("event state holds a valid discriminant")
    }

    /// Number of times execution has started.
    pub fn fire_count(&self) -> u64 {
        self.fire_count.load(Ordering::Acquire)
    }

    /// Receive lifecycle notices from now on.
    ///
    /// Subscribing to an event that already reached a terminal state
    /// yields a receiver holding that terminal notice, then disconnected.
    pub fn subscribe(&self) -> Receiver<EventNotice> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut subs = self.subscribers.lock();
        match &subs.closed {
            Some(terminal) => {
                let _ = tx.send(terminal.clone());
            }
            None => subs.senders.push(tx),
        }
        rx
    }

    /// Number of live subscriber channels.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().senders.len()
    }

    /// Cancel via the owning scheduler. `false` if never scheduled.
    pub fn cancel(&self) -> bool {
        self.with_owner(|s| s.cancel_event(self)).unwrap_or(false)
    }

    /// Expedite via the owning scheduler. `false` if never scheduled.
    pub fn expedite(&self) -> bool {
        self.with_owner(|s| s.expedite_event(self)).unwrap_or(false)
    }

    /// Delay via the owning scheduler. `false` if never scheduled.
    pub fn delay(&self, by: Duration) -> bool {
        self.with_owner(|s| s.delay_event(self, by)).unwrap_or(false)
    }

    fn with_owner<R>(&self, f: impl FnOnce(&Scheduler) -> R) -> Option<R> {
        let shared = self.owner.get()?.upgrade()?;
        Some(f(&Scheduler::from_shared(shared)))
    }

    // ── crate-internal lifecycle ─────────────────────────────────

    /// Win the right to enqueue this event. Exactly one caller succeeds.
    pub(crate) fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_claim(&self) {
        self.claimed.store(false, Ordering::Release);
    }

    /// Record the owning scheduler. Fails if a different scheduler owns it.
    pub(crate) fn bind_owner(&self, shared: &Arc<SchedulerShared>) -> bool {
        let weak = Arc::downgrade(shared);
        match self.owner.set(weak) {
            Ok(()) => true,
            Err(_) => self
                .owner
                .get()
                .is_some_and(|bound| Weak::ptr_eq(bound, &Arc::downgrade(shared))),
        }
    }

    /// Apply a state transition. Caller holds the queue lock.
    ///
    /// # Panics
    ///
    /// Panics if the transition is not in the state table or the current
    /// state is not `from`; either means the queue lost track of the event.
    pub(crate) fn transition(&self, from: EventState, to: EventState) {
        assert!(
            from.can_transition(to),
            "illegal transition {from} -> {to} for event {}",
            self.id
        );
        let prev = self.state.swap(to as u8, Ordering::AcqRel);
        assert_eq!(
            prev,
            from as u8,
            "event {} state desync: expected {from}, found {:?}",
            self.id,
            EventState::from_u8(prev)
        );
    }

    /// Bump the firing counter, returning the new ordinal.
    pub(crate) fn record_fire(&self) -> u64 {
        self.fire_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<(), ActionError> {
        self.action.execute(ctx)
    }

    /// Deliver `notice` to subscribers. A terminal notice closes the list.
    pub(crate) fn notify(&self, notice: EventNotice) {
        let mut subs = self.subscribers.lock();
        if subs.closed.is_some() {
            return;
        }
        if notice.is_terminal() {
            for tx in subs.senders.drain(..) {
                let _ = tx.send(notice.clone());
            }
            subs.closed = Some(notice);
        } else {
            subs.senders.retain(|tx| tx.send(notice.clone()).is_ok());
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("requestor", &self.requestor)
            .field("state", &self.state())
            .field("repeat_every", &self.repeat_every)
            .field("fire_count", &self.fire_count())
            .finish_non_exhaustive()
    }
}

// ── EventBuilder ─────────────────────────────────────────────────

/// Builder for [`Event`].
///
/// Defaults: kind [`EventKind::GENERIC`], no requestor, cancellable,
/// one-shot.
pub struct EventBuilder {
    action: Box<dyn Action>,
    kind: EventKind,
    requestor: Option<RequestorId>,
    cancellable: bool,
    repeat_every: Option<Duration>,
}

impl EventBuilder {
    /// Start from any [`Action`] implementation.
    pub fn with_action(action: impl Action + 'static) -> Self {
        Self {
            action: Box::new(action),
            kind: EventKind::GENERIC,
            requestor: None,
            cancellable: true,
            repeat_every: None,
        }
    }

    /// Set the category tag.
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attribute the event to a requestor.
    ///
    /// The reserved id 0 is accepted here and rejected at schedule time.
    pub fn requestor(mut self, requestor: RequestorId) -> Self {
        self.requestor = Some(requestor);
        self
    }

    /// Whether cancel requests are honoured.
    pub fn cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }

    /// Re-fire every `interval` after each execution. A zero interval
    /// means one-shot.
    pub fn repeat_every(mut self, interval: Duration) -> Self {
        self.repeat_every = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Finish building. The event starts in [`EventState::Created`].
    pub fn build(self) -> Arc<Event> {
        Arc::new(Event {
            id: EventId::next(),
            kind: self.kind,
            requestor: self.requestor,
            cancellable: self.cancellable,
            repeat_every: self.repeat_every,
            action: self.action,
            state: AtomicU8::new(EventState::Created as u8),
            fire_count: AtomicU64::new(0),
            claimed: AtomicBool::new(false),
            owner: OnceLock::new(),
            subscribers: Mutex::new(Subscribers {
                senders: SmallVec::new(),
                closed: None,
            }),
        })
    }
}

// Compile-time assertion: events are shared across the dispatch thread
// and producer threads.
const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Event>();
};
