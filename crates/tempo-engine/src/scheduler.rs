//! The public scheduling facade.
//!
//! [`Scheduler`] is a cheap-to-clone handle over shared state: the
//! [`EventQueue`], the [`RequestorIndex`], the injected [`Clock`], the
//! registered fire observers, and the deferred-insert channel. Any number
//! of threads may schedule, cancel, expedite, and delay through clones of
//! the same handle while one dispatch loop (see [`crate::dispatch`])
//! executes due events.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tempo_core::{Clock, EventId, EventKind, RequestorId, ScheduleError, SystemClock};
use tracing::debug;

use crate::config::{ConfigError, SchedulerConfig};
use crate::event::Event;
use crate::metrics::{bump, MetricCounters, SchedulerMetrics};
use crate::queue::EventQueue;
use crate::requestor::RequestorIndex;
use crate::telemetry::FireObserver;

/// An insert waiting in the deferred channel. The fire time was fixed
/// when the producer called [`Scheduler::schedule_event_deferred`].
pub(crate) struct DeferredInsert {
    pub(crate) event: Arc<Event>,
    pub(crate) fire_at: Instant,
}

pub(crate) struct SchedulerShared {
    pub(crate) queue: EventQueue,
    pub(crate) index: RequestorIndex,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: SchedulerConfig,
    pub(crate) counters: MetricCounters,
    pub(crate) observers: RwLock<Vec<Arc<dyn FireObserver>>>,
    pub(crate) deferred_tx: Sender<DeferredInsert>,
    pub(crate) deferred_rx: Receiver<DeferredInsert>,
    pub(crate) stopping: AtomicBool,
}

/// Handle to a scheduler. Clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
}

impl Scheduler {
    /// Build a scheduler reading time from `clock`.
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let (deferred_tx, deferred_rx) = crossbeam_channel::bounded(config.deferred_capacity);
        Ok(Self {
            shared: Arc::new(SchedulerShared {
                queue: EventQueue::new(config.max_pending_events),
                index: RequestorIndex::new(),
                clock,
                config,
                counters: MetricCounters::default(),
                observers: RwLock::new(Vec::new()),
                deferred_tx,
                deferred_rx,
                stopping: AtomicBool::new(false),
            }),
        })
    }

    /// Build a scheduler on the wall clock.
    pub fn with_system_clock(config: SchedulerConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(SystemClock))
    }

    pub(crate) fn from_shared(shared: Arc<SchedulerShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<SchedulerShared> {
        &self.shared
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// The underlying queue.
    pub fn queue(&self) -> &EventQueue {
        &self.shared.queue
    }

    // ── scheduling ───────────────────────────────────────────────

    /// Schedule `event` to fire after `delay` (`None` = now).
    ///
    /// Records ownership in the requestor index, then inserts into the
    /// queue. The event must be freshly built: an event is scheduled at
    /// most once in its life.
    pub fn schedule_event(
        &self,
        event: &Arc<Event>,
        delay: Option<Duration>,
    ) -> Result<(), ScheduleError> {
        self.admit(event)?;
        let fire_at = self.fire_at_after(delay);
        self.enqueue(event, fire_at)?;
        debug!(
            event_id = %event.id(),
            kind = %event.kind(),
            requestor = ?event.requestor(),
            ?delay,
            "event scheduled"
        );
        Ok(())
    }

    /// Schedule `event` through the deferred channel.
    ///
    /// The fire time is computed now; the insert itself is applied by the
    /// dispatch loop at the start of its next cycle. Never touches the
    /// queue lock, so it is safe to call from latency-sensitive threads.
    /// Returns [`ScheduleError::ChannelFull`] when the channel is at
    /// capacity. An insert rejected when applied (queue full) is logged
    /// and counted in [`SchedulerMetrics::deferred_rejections`].
    pub fn schedule_event_deferred(
        &self,
        event: &Arc<Event>,
        delay: Option<Duration>,
    ) -> Result<(), ScheduleError> {
        self.admit(event)?;
        let fire_at = self.fire_at_after(delay);
        let insert = DeferredInsert {
            event: Arc::clone(event),
            fire_at,
        };
        match self.shared.deferred_tx.try_send(insert) {
            Ok(()) => {
                self.shared.queue.wake();
                debug!(event_id = %event.id(), kind = %event.kind(), ?delay, "event deferred");
                Ok(())
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                event.release_claim();
                Err(ScheduleError::ChannelFull)
            }
        }
    }

    /// Checks shared by both scheduling paths. On success the caller holds
    /// the event's claim and must release it if the insert fails.
    fn admit(&self, event: &Arc<Event>) -> Result<(), ScheduleError> {
        if self.is_stopping() {
            return Err(ScheduleError::ShuttingDown);
        }
        if event.requestor().is_some_and(|r| !r.is_valid()) {
            return Err(ScheduleError::InvalidRequestor);
        }
        if !event.try_claim() {
            return Err(ScheduleError::InvalidEvent {
                reason: format!("event {} was already scheduled", event.id()),
            });
        }
        if !event.bind_owner(&self.shared) {
            event.release_claim();
            return Err(ScheduleError::InvalidEvent {
                reason: format!("event {} belongs to another scheduler", event.id()),
            });
        }
        Ok(())
    }

    /// Index first, then queue. Undoes the index entry and releases the
    /// claim if the queue refuses the event.
    pub(crate) fn enqueue(&self, event: &Arc<Event>, fire_at: Instant) -> Result<(), ScheduleError> {
        let shared = &self.shared;
        if let Some(requestor) = event.requestor() {
            shared.index.insert(requestor, event.id(), event.kind());
        }
        if let Err(e) = shared.queue.insert(event, fire_at) {
            if let Some(requestor) = event.requestor() {
                shared.index.remove(requestor, event.id());
            }
            event.release_claim();
            return Err(e);
        }
        bump(&shared.counters.scheduled);
        Ok(())
    }

    fn fire_at_after(&self, delay: Option<Duration>) -> Instant {
        let now = self.current_time();
        delay.and_then(|d| now.checked_add(d)).unwrap_or(now)
    }

    // ── queries ──────────────────────────────────────────────────

    /// Time remaining until `event` is due. Zero if it is already due or
    /// not scheduled.
    pub fn calculate_time_to_fire(&self, event: &Event) -> Duration {
        self.shared
            .queue
            .fire_time(event.id())
            .map_or(Duration::ZERO, |at| {
                at.saturating_duration_since(self.current_time())
            })
    }

    /// The scheduler's clock reading.
    pub fn current_time(&self) -> Instant {
        self.shared.clock.now()
    }

    /// Events in the `Scheduled` state.
    pub fn queue_size(&self) -> usize {
        self.shared.queue.len()
    }

    /// Events `requestor` currently owns.
    pub fn pending_for(&self, requestor: RequestorId) -> usize {
        self.shared.index.owned_count(requestor)
    }

    /// Earliest due time waiting in the queue.
    pub fn next_fire_time(&self) -> Option<Instant> {
        self.shared.queue.next_fire_time()
    }

    /// Snapshot of cumulative counters.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared.counters.snapshot()
    }

    /// Whether the stop signal has been triggered.
    pub fn is_stopping(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    // ── mutation ─────────────────────────────────────────────────

    /// Cancel `event`. See [`Event::cancel`] for when this succeeds.
    pub fn cancel_event(&self, event: &Event) -> bool {
        self.cancel_by_id(event.id())
    }

    fn cancel_by_id(&self, id: EventId) -> bool {
        let Some(event) = self.shared.queue.cancel(id) else {
            return false;
        };
        if let Some(requestor) = event.requestor() {
            self.shared.index.remove(requestor, id);
        }
        bump(&self.shared.counters.cancelled);
        debug!(event_id = %id, kind = %event.kind(), "event cancelled");
        true
    }

    /// Cancel every event owned by `requestor`, optionally only those of
    /// one kind. Returns how many were cancelled.
    ///
    /// Events that fire or are cancelled concurrently are not counted.
    pub fn cancel_all_for(
        &self,
        requestor: RequestorId,
        kind: Option<EventKind>,
    ) -> Result<usize, ScheduleError> {
        if !requestor.is_valid() {
            return Err(ScheduleError::InvalidRequestor);
        }
        let cancelled = self
            .shared
            .index
            .cancel_all_for(requestor, kind, |id| self.cancel_by_id(id));
        debug!(%requestor, ?kind, cancelled, "bulk cancellation");
        Ok(cancelled)
    }

    /// Make `event` due now, ahead of events with later fire times.
    pub fn expedite_event(&self, event: &Event) -> bool {
        let now = self.current_time();
        match self.shared.queue.expedite(event.id(), now) {
            Some(_) => {
                bump(&self.shared.counters.expedited);
                debug!(event_id = %event.id(), kind = %event.kind(), "event expedited");
                true
            }
            None => false,
        }
    }

    /// Push `event` back by `by`.
    ///
    /// The new fire time is the old one plus `by`, but never earlier than
    /// now. Delays above [`SchedulerConfig::max_delay`] are refused. A zero
    /// delay succeeds without moving the event.
    pub fn delay_event(&self, event: &Event, by: Duration) -> bool {
        if self.shared.config.max_delay.is_some_and(|max| by > max) {
            return false;
        }
        if by.is_zero() {
            return self.shared.queue.fire_time(event.id()).is_some();
        }
        let now = self.current_time();
        match self.shared.queue.delay(event.id(), by, now) {
            Some(_) => {
                bump(&self.shared.counters.delayed);
                debug!(event_id = %event.id(), kind = %event.kind(), ?by, "event delayed");
                true
            }
            None => false,
        }
    }

    // ── observers ────────────────────────────────────────────────

    /// Register a listener called after every execution.
    pub fn add_fire_observer(&self, observer: Arc<dyn FireObserver>) {
        self.shared.observers.write().push(observer);
    }

    /// Number of registered fire observers.
    pub fn fire_observer_count(&self) -> usize {
        self.shared.observers.read().len()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue_size", &self.queue_size())
            .field("stopping", &self.is_stopping())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

// Compile-time assertion: handles cross threads freely.
const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Scheduler>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::EventState;
    use tempo_test_utils::ManualClock;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn setup() -> (Scheduler, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        let sched = Scheduler::new(SchedulerConfig::default(), clock.clone()).unwrap();
        (sched, clock)
    }

    fn noop() -> Arc<Event> {
        Event::builder(|_| Ok(())).build()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SchedulerConfig {
            max_pending_events: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(
            Scheduler::with_system_clock(cfg).unwrap_err(),
            ConfigError::QueueCapacityZero
        );
    }

    #[test]
    fn schedule_sets_fire_time_from_clock() {
        let (sched, clock) = setup();
        clock.advance(ms(10));
        let e = noop();
        sched.schedule_event(&e, Some(ms(40))).unwrap();
        assert_eq!(e.state(), EventState::Scheduled);
        assert_eq!(sched.next_fire_time(), Some(clock.at(ms(50))));
        assert_eq!(sched.calculate_time_to_fire(&e), ms(40));
        clock.advance(ms(100));
        assert_eq!(sched.calculate_time_to_fire(&e), Duration::ZERO);
    }

    #[test]
    fn no_delay_means_due_now() {
        let (sched, clock) = setup();
        let e = noop();
        sched.schedule_event(&e, None).unwrap();
        assert_eq!(sched.next_fire_time(), Some(clock.now()));
    }

    #[test]
    fn double_schedule_is_rejected() {
        let (sched, _clock) = setup();
        let e = noop();
        sched.schedule_event(&e, None).unwrap();
        assert!(matches!(
            sched.schedule_event(&e, None),
            Err(ScheduleError::InvalidEvent { .. })
        ));
        assert_eq!(sched.queue_size(), 1);
    }

    #[test]
    fn event_cannot_move_between_schedulers() {
        let (a, _) = setup();
        let (b, _) = setup();
        let e = noop();
        a.schedule_event(&e, None).unwrap();
        assert!(a.cancel_event(&e));
        assert!(matches!(
            b.schedule_event(&e, None),
            Err(ScheduleError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn reserved_requestor_is_rejected() {
        let (sched, _clock) = setup();
        let e = Event::builder(|_| Ok(())).requestor(RequestorId(0)).build();
        assert_eq!(
            sched.schedule_event(&e, None),
            Err(ScheduleError::InvalidRequestor)
        );
        assert_eq!(e.state(), EventState::Created);
        assert_eq!(
            sched.cancel_all_for(RequestorId(0), None),
            Err(ScheduleError::InvalidRequestor)
        );
    }

    #[test]
    fn queue_full_leaves_event_reusable() {
        let clock = ManualClock::shared();
        let cfg = SchedulerConfig {
            max_pending_events: 1,
            ..SchedulerConfig::default()
        };
        let sched = Scheduler::new(cfg, clock).unwrap();
        let first = noop();
        let second = Event::builder(|_| Ok(())).requestor(RequestorId(4)).build();
        sched.schedule_event(&first, None).unwrap();
        assert_eq!(
            sched.schedule_event(&second, None),
            Err(ScheduleError::QueueFull { capacity: 1 })
        );
        assert_eq!(sched.pending_for(RequestorId(4)), 0);
        assert!(sched.cancel_event(&first));
        sched.schedule_event(&second, None).unwrap();
        assert_eq!(sched.pending_for(RequestorId(4)), 1);
    }

    #[test]
    fn requestor_index_tracks_ownership() {
        let (sched, _clock) = setup();
        let r = RequestorId(12);
        let a = Event::builder(|_| Ok(())).requestor(r).build();
        let b = Event::builder(|_| Ok(())).requestor(r).build();
        sched.schedule_event(&a, Some(ms(5))).unwrap();
        sched.schedule_event(&b, Some(ms(5))).unwrap();
        assert_eq!(sched.pending_for(r), 2);
        assert!(sched.cancel_event(&a));
        assert_eq!(sched.pending_for(r), 1);
    }

    #[test]
    fn cancel_all_for_filters_by_kind() {
        let (sched, _clock) = setup();
        let r = RequestorId(3);
        let movement = EventKind::new("movement");
        let make = |kind| Event::builder(|_| Ok(())).requestor(r).kind(kind).build();
        let moves = [make(movement), make(movement)];
        let other = make(EventKind::new("regen"));
        for e in moves.iter().chain(std::iter::once(&other)) {
            sched.schedule_event(e, Some(ms(100))).unwrap();
        }
        assert_eq!(sched.cancel_all_for(r, Some(movement)), Ok(2));
        assert!(moves.iter().all(|e| e.state() == EventState::Cancelled));
        assert_eq!(other.state(), EventState::Scheduled);
        assert_eq!(sched.cancel_all_for(r, None), Ok(1));
        assert_eq!(sched.pending_for(r), 0);
    }

    #[test]
    fn event_level_operations_delegate() {
        let (sched, clock) = setup();
        let e = noop();
        sched.schedule_event(&e, Some(ms(100))).unwrap();
        assert!(e.delay(ms(50)));
        assert_eq!(sched.calculate_time_to_fire(&e), ms(150));
        assert!(e.expedite());
        assert_eq!(sched.next_fire_time(), Some(clock.now()));
        assert!(e.cancel());
        assert!(!e.cancel());
        assert!(!e.expedite());
        assert!(!e.delay(ms(1)));
        let m = sched.metrics();
        assert_eq!((m.delayed, m.expedited, m.cancelled), (1, 1, 1));
    }

    #[test]
    fn delay_policy() {
        let clock = ManualClock::shared();
        let cfg = SchedulerConfig {
            max_delay: Some(ms(500)),
            ..SchedulerConfig::default()
        };
        let sched = Scheduler::new(cfg, clock.clone()).unwrap();
        let e = noop();
        sched.schedule_event(&e, Some(ms(10))).unwrap();
        assert!(!sched.delay_event(&e, ms(501)));
        assert!(sched.delay_event(&e, Duration::ZERO));
        assert_eq!(sched.calculate_time_to_fire(&e), ms(10));
        clock.advance(ms(300));
        // Old fire time + 20ms is in the past; clamp to now.
        assert!(sched.delay_event(&e, ms(20)));
        assert_eq!(sched.next_fire_time(), Some(clock.now()));
    }

    #[test]
    fn overflowing_delay_reports_failure() {
        let (sched, _clock) = setup();
        let e = noop();
        sched.schedule_event(&e, Some(ms(10))).unwrap();
        assert!(!sched.delay_event(&e, Duration::MAX));
        assert_eq!(sched.calculate_time_to_fire(&e), ms(10));
        assert_eq!(sched.metrics().delayed, 0);
    }

    #[test]
    fn zero_delay_on_unscheduled_event_fails() {
        let (sched, _clock) = setup();
        assert!(!sched.delay_event(&noop(), Duration::ZERO));
    }

    #[test]
    fn non_cancellable_event_ignores_cancel() {
        let (sched, _clock) = setup();
        let e = Event::builder(|_| Ok(())).cancellable(false).build();
        sched.schedule_event(&e, None).unwrap();
        assert!(!sched.cancel_event(&e));
        assert_eq!(e.state(), EventState::Scheduled);
    }

    #[test]
    fn deferred_insert_waits_for_dispatch() {
        let (sched, clock) = setup();
        let e = noop();
        sched.schedule_event_deferred(&e, Some(ms(20))).unwrap();
        assert_eq!(e.state(), EventState::Created);
        assert_eq!(sched.queue_size(), 0);
        // Fire time was fixed at call time, not at apply time.
        clock.advance(ms(15));
        sched.dispatch_due();
        assert_eq!(e.state(), EventState::Scheduled);
        assert_eq!(sched.next_fire_time(), Some(clock.at(ms(20))));
    }

    #[test]
    fn deferred_channel_back_pressure() {
        let cfg = SchedulerConfig {
            deferred_capacity: 1,
            ..SchedulerConfig::default()
        };
        let sched = Scheduler::new(cfg, ManualClock::shared()).unwrap();
        sched.schedule_event_deferred(&noop(), None).unwrap();
        let refused = noop();
        assert_eq!(
            sched.schedule_event_deferred(&refused, None),
            Err(ScheduleError::ChannelFull)
        );
        // The refused event can still be scheduled directly.
        sched.schedule_event(&refused, None).unwrap();
    }

    #[test]
    fn stopped_scheduler_refuses_new_events() {
        let (sched, _clock) = setup();
        sched.stop_signal().trigger();
        assert_eq!(
            sched.schedule_event(&noop(), None),
            Err(ScheduleError::ShuttingDown)
        );
        assert!(sched.is_stopping());
    }

    #[test]
    fn clones_share_state() {
        let (sched, _clock) = setup();
        let other = sched.clone();
        other.schedule_event(&noop(), None).unwrap();
        assert_eq!(sched.queue_size(), 1);
    }
}
