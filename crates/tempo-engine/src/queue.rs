//! Time-ordered event queue with positional index.
//!
//! [`EventQueue`] is a binary min-heap keyed by `(fire_at, seq)` plus a
//! hash map from [`EventId`] to the event's current slot. The map makes
//! cancel, expedite, and delay `O(log n)`: the heap entry is found by
//! position rather than by scan.
//!
//! # Ordering
//!
//! `seq` is a monotonic counter assigned on every (re)insertion, so
//! events with equal fire times come out in the order they were last
//! placed in the heap. Repositioning an event gives it a fresh `seq`.
//!
//! # Slots
//!
//! Every event the queue is responsible for lives in exactly one place:
//!
//! - `Heap(pos)`: waiting; `heap[pos]` holds its entry.
//! - `InHand`: returned by [`extract_due`](EventQueue::extract_due), not
//!   yet started. Still `Scheduled`, so it can be cancelled or delayed.
//! - `Executing`: the action is running.
//!
//! [`len`](EventQueue::len) counts `Heap` and `InHand` slots, which is
//! exactly the number of events in the `Scheduled` state.
//!
//! All state transitions and the notices describing them happen under
//! the queue lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tempo_core::{Clock, EventId, EventState, FaultKind, ScheduleError};
use tracing::warn;

use crate::event::{Event, EventNotice};

/// An event handed out by [`EventQueue::extract_due`].
#[derive(Clone, Debug)]
pub struct DueEvent {
    /// The due event.
    pub event: Arc<Event>,
    /// The time it was due.
    pub fire_at: Instant,
}

/// What happened to an event when its execution finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Finish {
    /// Repeating event placed back in the heap.
    Rescheduled {
        /// Its next due time.
        fire_at: Instant,
    },
    /// Moved to `Completed` (normally or after a fault).
    Completed,
    /// Cancelled while its action ran.
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeapEntry {
    fire_at: Instant,
    seq: u64,
    id: EventId,
}

impl HeapEntry {
    fn key(&self) -> (Instant, u64) {
        (self.fire_at, self.seq)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Place {
    Heap(usize),
    InHand,
    Executing,
}

struct Slot {
    event: Arc<Event>,
    fire_at: Instant,
    place: Place,
}

struct QueueInner {
    heap: Vec<HeapEntry>,
    slots: HashMap<EventId, Slot>,
    next_seq: u64,
    executing: usize,
}

impl QueueInner {
    fn scheduled_len(&self) -> usize {
        self.slots.len() - self.executing
    }

    /// Push a heap entry for an existing slot. Returns its final position.
    fn push(&mut self, id: EventId, fire_at: Instant) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(HeapEntry { fire_at, seq, id });
        let pos = self.heap.len() - 1;
        self.set_heap_pos(id, pos);
        self.sift_up(pos)
    }

    /// Remove the entry at `pos`, restoring the heap property.
    ///
    /// The removed entry's slot keeps a stale place; callers overwrite
    /// or drop it.
    fn remove_at(&mut self, pos: usize) -> HeapEntry {
        let last = self.heap.len() - 1;
        if pos != last {
            self.swap(pos, last);
        }
        let entry = self.heap.pop().expect("remove_at called on empty heap");
        if pos < self.heap.len() && self.sift_up(pos) == pos {
            self.sift_down(pos);
        }
        entry
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].key() >= self.heap[parent].key() {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.heap[left].key() < self.heap[smallest].key() {
                smallest = left;
            }
            if right < len && self.heap[right].key() < self.heap[smallest].key() {
                smallest = right;
            }
            if smallest == pos {
                return;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let (id_a, id_b) = (self.heap[a].id, self.heap[b].id);
        self.set_heap_pos(id_a, a);
        self.set_heap_pos(id_b, b);
    }

    fn set_heap_pos(&mut self, id: EventId, pos: usize) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.place = Place::Heap(pos);
        }
    }

    /// Move a `Scheduled` event to `new_fire_at` with a fresh seq.
    ///
    /// Returns `None` if the event is not in the queue or is executing.
    fn reposition(&mut self, id: EventId, new_fire_at: Instant) -> Option<usize> {
        let place = self.slots.get(&id)?.place;
        match place {
            Place::Executing => return None,
            Place::Heap(pos) => {
                self.remove_at(pos);
            }
            Place::InHand => {}
        }
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.fire_at = new_fire_at;
        }
        Some(self.push(id, new_fire_at))
    }
}

/// Bounded, time-ordered queue of scheduled events.
///
/// All methods take `&self`; the queue is shared between producer
/// threads and the dispatch loop.
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    wakeup: Condvar,
    capacity: usize,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` scheduled events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "EventQueue capacity must be at least 1");
        Self {
            inner: Mutex::new(QueueInner {
                heap: Vec::new(),
                slots: HashMap::new(),
                next_seq: 0,
                executing: 0,
            }),
            wakeup: Condvar::new(),
            capacity,
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events in the `Scheduled` state.
    pub fn len(&self) -> usize {
        self.inner.lock().scheduled_len()
    }

    /// Whether no event is scheduled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events whose action is currently running.
    pub fn executing(&self) -> usize {
        self.inner.lock().executing
    }

    /// Earliest due time among events waiting in the heap.
    pub fn next_fire_time(&self) -> Option<Instant> {
        self.inner.lock().heap.first().map(|e| e.fire_at)
    }

    /// Due time of a scheduled event, `None` if it is not scheduled here.
    pub fn fire_time(&self, id: EventId) -> Option<Instant> {
        let inner = self.inner.lock();
        let slot = inner.slots.get(&id)?;
        (slot.place != Place::Executing).then_some(slot.fire_at)
    }

    /// Whether the queue holds the event in any place.
    pub fn contains(&self, id: EventId) -> bool {
        self.inner.lock().slots.contains_key(&id)
    }

    /// Insert a `Created` event, moving it to `Scheduled`.
    ///
    /// # Panics
    ///
    /// Panics if an event with the same id is already present.
    pub fn insert(&self, event: &Arc<Event>, fire_at: Instant) -> Result<(), ScheduleError> {
        let mut inner = self.inner.lock();
        let state = event.state();
        if state != EventState::Created {
            return Err(ScheduleError::InvalidEvent {
                reason: format!("event {} is already {state}", event.id()),
            });
        }
        if inner.scheduled_len() >= self.capacity {
            return Err(ScheduleError::QueueFull {
                capacity: self.capacity,
            });
        }
        let id = event.id();
        assert!(
            !inner.slots.contains_key(&id),
            "duplicate event id {id} in queue"
        );
        event.transition(EventState::Created, EventState::Scheduled);
        inner.slots.insert(
            id,
            Slot {
                event: Arc::clone(event),
                fire_at,
                place: Place::InHand,
            },
        );
        let pos = inner.push(id, fire_at);
        event.notify(EventNotice::Scheduled { fire_at });
        drop(inner);
        if pos == 0 {
            self.wakeup.notify_all();
        }
        Ok(())
    }

    /// Pop every event due at or before `now`, ascending by `(fire_at, seq)`.
    ///
    /// Extracted events stay `Scheduled` (and counted by [`len`](Self::len))
    /// until the dispatch loop starts them.
    pub fn extract_due(&self, now: Instant) -> Vec<DueEvent> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while inner.heap.first().is_some_and(|top| top.fire_at <= now) {
            let entry = inner.remove_at(0);
            if let Some(slot) = inner.slots.get_mut(&entry.id) {
                slot.place = Place::InHand;
                due.push(DueEvent {
                    event: Arc::clone(&slot.event),
                    fire_at: entry.fire_at,
                });
            }
        }
        due
    }

    /// Move a scheduled event to `new_fire_at`.
    ///
    /// An in-hand event goes back into the heap. Returns `false` if the
    /// event is not scheduled here.
    pub fn reposition(&self, id: EventId, new_fire_at: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.reposition(id, new_fire_at) {
            Some(pos) => {
                drop(inner);
                if pos == 0 {
                    self.wakeup.notify_all();
                }
                true
            }
            None => false,
        }
    }

    /// Make a scheduled event due at `now`.
    ///
    /// An in-hand event is already due and is left where it is. Returns
    /// the effective due time, or `None` if the event is not scheduled.
    pub fn expedite(&self, id: EventId, now: Instant) -> Option<Instant> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get(&id)?;
        let (event, place, current) = (Arc::clone(&slot.event), slot.place, slot.fire_at);
        let fire_at = match place {
            Place::Executing => return None,
            Place::InHand => current,
            Place::Heap(_) => {
                let fire_at = now.min(current);
                let pos = inner.reposition(id, fire_at)?;
                if pos == 0 {
                    self.wakeup.notify_all();
                }
                fire_at
            }
        };
        event.notify(EventNotice::Expedited { fire_at });
        Some(fire_at)
    }

    /// Push a scheduled event back by `by`, never earlier than `now`.
    ///
    /// An in-hand event returns to the heap and is skipped by the batch
    /// that extracted it. Returns the new due time, or `None` if the event
    /// is not scheduled or `by` overflows its due time.
    pub fn delay(&self, id: EventId, by: Duration, now: Instant) -> Option<Instant> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get(&id)?;
        if slot.place == Place::Executing {
            return None;
        }
        let (event, current) = (Arc::clone(&slot.event), slot.fire_at);
        let fire_at = current.checked_add(by)?.max(now);
        let pos = inner.reposition(id, fire_at)?;
        event.notify(EventNotice::Delayed { fire_at });
        drop(inner);
        if pos == 0 {
            self.wakeup.notify_all();
        }
        Some(fire_at)
    }

    /// Remove an event for cancellation, moving it to `Cancelled`.
    ///
    /// Succeeds for a cancellable event that is `Scheduled`, or that is
    /// `Executing` and repeating (its future repeats are suppressed).
    /// Returns the removed event.
    pub fn cancel(&self, id: EventId) -> Option<Arc<Event>> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get(&id)?;
        if !slot.event.is_cancellable() {
            return None;
        }
        let (place, repeating) = (slot.place, slot.event.is_repeating());
        let from = match place {
            Place::Heap(pos) => {
                inner.remove_at(pos);
                EventState::Scheduled
            }
            Place::InHand => EventState::Scheduled,
            Place::Executing => {
                if !repeating {
                    return None;
                }
                inner.executing -= 1;
                EventState::Executing
            }
        };
        let slot = inner.slots.remove(&id)?;
        slot.event.transition(from, EventState::Cancelled);
        slot.event.notify(EventNotice::Cancelled);
        Some(slot.event)
    }

    /// Start executing an extracted event.
    ///
    /// Returns `false` if the event was cancelled or delayed since
    /// extraction; the dispatch loop then skips it.
    pub(crate) fn begin_execution(&self, id: EventId) -> bool {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get_mut(&id) else {
            return false;
        };
        if slot.place != Place::InHand {
            return false;
        }
        slot.place = Place::Executing;
        let event = Arc::clone(&slot.event);
        inner.executing += 1;
        event.transition(EventState::Scheduled, EventState::Executing);
        let fire_count = event.record_fire();
        event.notify(EventNotice::Fired { fire_count });
        true
    }

    /// Finish an execution started by [`begin_execution`](Self::begin_execution).
    ///
    /// A repeating event re-enters the heap at `now + interval` unless the
    /// run faulted. A fault always completes the event, as does an interval
    /// too large to add to `now`.
    pub(crate) fn finish_execution(
        &self,
        id: EventId,
        now: Instant,
        fault: Option<&FaultKind>,
    ) -> Finish {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get(&id) else {
            return Finish::Cancelled;
        };
        assert_eq!(
            slot.place,
            Place::Executing,
            "finish_execution for event {id} that is not executing"
        );
        let event = Arc::clone(&slot.event);
        let next_fire_at = match (fault, event.repeat_every()) {
            (None, Some(every)) => {
                let next = now.checked_add(every);
                if next.is_none() {
                    warn!(
                        event_id = %id,
                        kind = %event.kind(),
                        ?every,
                        "repeat interval overflows the clock; completing event"
                    );
                }
                next
            }
            _ => None,
        };
        inner.executing -= 1;
        match next_fire_at {
            Some(fire_at) => {
                event.transition(EventState::Executing, EventState::Scheduled);
                if let Some(slot) = inner.slots.get_mut(&id) {
                    slot.fire_at = fire_at;
                }
                let pos = inner.push(id, fire_at);
                event.notify(EventNotice::Scheduled { fire_at });
                drop(inner);
                if pos == 0 {
                    self.wakeup.notify_all();
                }
                Finish::Rescheduled { fire_at }
            }
            None => {
                inner.slots.remove(&id);
                event.transition(EventState::Executing, EventState::Completed);
                event.notify(match fault {
                    Some(f) => EventNotice::Faulted(f.clone()),
                    None => EventNotice::Completed,
                });
                Finish::Completed
            }
        }
    }

    /// Block until there may be work for the dispatch loop.
    ///
    /// Returns immediately if `wake_now` holds or an event is already due;
    /// otherwise sleeps until the next due time, `max_wait`, or a wakeup,
    /// whichever comes first. `wake_now` is evaluated under the queue lock,
    /// so a producer that sets its condition before calling
    /// [`wake`](Self::wake) is never missed.
    pub fn wait_for_work(&self, clock: &dyn Clock, max_wait: Duration, wake_now: impl Fn() -> bool) {
        let mut inner = self.inner.lock();
        if wake_now() {
            return;
        }
        let now = clock.now();
        let timeout = match inner.heap.first() {
            Some(top) if top.fire_at <= now => return,
            Some(top) => (top.fire_at - now).min(max_wait),
            None => max_wait,
        };
        self.wakeup.wait_for(&mut inner, timeout);
    }

    /// Wake a thread blocked in [`wait_for_work`](Self::wait_for_work).
    pub fn wake(&self) {
        let _inner = self.inner.lock();
        self.wakeup.notify_all();
    }

    /// Verify heap order, slot positions, and counters.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first inconsistency found.
    pub fn check_invariants(&self) {
        let inner = self.inner.lock();
        for (pos, entry) in inner.heap.iter().enumerate() {
            if pos > 0 {
                let parent = &inner.heap[(pos - 1) / 2];
                assert!(
                    parent.key() <= entry.key(),
                    "heap order violated at position {pos}"
                );
            }
            let slot = inner
                .slots
                .get(&entry.id)
                .unwrap_or_else(|| panic!("heap entry {} has no slot", entry.id));
            assert_eq!(
                slot.place,
                Place::Heap(pos),
                "slot of event {} points at the wrong heap position",
                entry.id
            );
            assert_eq!(slot.fire_at, entry.fire_at, "fire time desync for {}", entry.id);
            assert_eq!(slot.event.state(), EventState::Scheduled);
        }
        let mut in_heap = 0;
        let mut executing = 0;
        for slot in inner.slots.values() {
            match slot.place {
                Place::Heap(_) => in_heap += 1,
                Place::InHand => assert_eq!(slot.event.state(), EventState::Scheduled),
                Place::Executing => {
                    executing += 1;
                    assert_eq!(slot.event.state(), EventState::Executing);
                }
            }
        }
        assert_eq!(in_heap, inner.heap.len(), "heap and slot map disagree");
        assert_eq!(executing, inner.executing, "executing counter drifted");
    }
}
