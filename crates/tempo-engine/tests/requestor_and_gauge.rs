//! Bulk cancellation exactness and queue-size gauge accuracy.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;
use tempo_core::{EventKind, EventState, RequestorId};
use tempo_engine::telemetry::QUEUE_SIZE;
use tempo_engine::{
    Event, FireObserver, FiredNotice, Scheduler, SchedulerConfig, TelemetryObserver,
};
use tempo_test_utils::{ManualClock, RecordingSink};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn setup() -> (Scheduler, Arc<ManualClock>) {
    let clock = ManualClock::shared();
    let sched = Scheduler::new(SchedulerConfig::default(), clock.clone()).unwrap();
    (sched, clock)
}

const MOVE: EventKind = EventKind::new("movement");
const CAST: EventKind = EventKind::new("spellcast");

#[test]
fn cancel_all_for_touches_only_that_requestor() {
    let (sched, clock) = setup();
    let mut events = Vec::new();
    for r in 1..=3u64 {
        for i in 0..5u64 {
            let kind = if i % 2 == 0 { MOVE } else { CAST };
            let e = Event::builder(|_| Ok(()))
                .requestor(RequestorId(r))
                .kind(kind)
                .build();
            sched.schedule_event(&e, Some(ms(10 + i))).unwrap();
            events.push((r, e));
        }
    }
    // One of requestor 2's events has already fired and completed.
    let done = Event::builder(|_| Ok(())).requestor(RequestorId(2)).build();
    sched.schedule_event(&done, None).unwrap();
    sched.dispatch_due();
    assert_eq!(done.state(), EventState::Completed);

    assert_eq!(sched.cancel_all_for(RequestorId(2), None), Ok(5));
    for (r, e) in &events {
        let expected = if *r == 2 {
            EventState::Cancelled
        } else {
            EventState::Scheduled
        };
        assert_eq!(e.state(), expected, "requestor {r}");
    }
    assert_eq!(sched.pending_for(RequestorId(2)), 0);
    assert_eq!(sched.queue_size(), 10);

    // Second pass finds nothing.
    assert_eq!(sched.cancel_all_for(RequestorId(2), None), Ok(0));

    clock.advance(ms(100));
    sched.dispatch_due();
    assert_eq!(sched.metrics().fired, 11);
}

#[test]
fn cancel_all_for_skips_non_cancellable() {
    let (sched, _clock) = setup();
    let r = RequestorId(4);
    let pinned = Event::builder(|_| Ok(()))
        .requestor(r)
        .cancellable(false)
        .build();
    let normal = Event::builder(|_| Ok(())).requestor(r).build();
    sched.schedule_event(&pinned, Some(ms(10))).unwrap();
    sched.schedule_event(&normal, Some(ms(10))).unwrap();
    assert_eq!(sched.cancel_all_for(r, None), Ok(1));
    assert_eq!(pinned.state(), EventState::Scheduled);
    assert_eq!(sched.pending_for(r), 1);
}

#[test]
fn cancel_all_for_by_kind() {
    let (sched, _clock) = setup();
    let r = RequestorId(8);
    let moves: Vec<_> = (0..3)
        .map(|_| Event::builder(|_| Ok(())).requestor(r).kind(MOVE).build())
        .collect();
    let cast = Event::builder(|_| Ok(())).requestor(r).kind(CAST).build();
    for e in moves.iter().chain([&cast]) {
        sched.schedule_event(e, Some(ms(50))).unwrap();
    }
    assert_eq!(sched.cancel_all_for(r, Some(MOVE)), Ok(3));
    assert_eq!(cast.state(), EventState::Scheduled);
}

#[test]
fn telemetry_observer_reports_each_firing() {
    let (sched, clock) = setup();
    let sink = Arc::new(RecordingSink::new());
    sched.add_fire_observer(Arc::new(TelemetryObserver::new(Arc::clone(&sink))));
    for d in [10, 20, 30] {
        let e = Event::builder(|_| Ok(())).kind(MOVE).build();
        sched.schedule_event(&e, Some(ms(d))).unwrap();
    }
    clock.advance(ms(25));
    sched.dispatch_due();
    // The first firing still counts the second (extracted, not yet run)
    // as scheduled.
    assert_eq!(sink.gauge_values(QUEUE_SIZE), vec![2, 1]);
    let latencies: Vec<_> = sink
        .timings("scheduler.event_processing_time")
        .into_iter()
        .map(|(kind, d)| {
            assert_eq!(kind, "movement");
            d
        })
        .collect();
    assert_eq!(latencies, vec![ms(15), ms(5)]);
}

/// Checks, at every firing, that the reported queue size equals the number
/// of tracked events in the `Scheduled` state.
struct GaugeAudit {
    events: Mutex<Vec<Arc<Event>>>,
    mismatches: Mutex<Vec<(usize, usize)>>,
}

impl FireObserver for GaugeAudit {
    fn on_fired(&self, notice: &FiredNotice) {
        let scheduled = self
            .events
            .lock()
            .iter()
            .filter(|e| e.state() == EventState::Scheduled)
            .count();
        if scheduled != notice.queue_size {
            self.mismatches.lock().push((notice.queue_size, scheduled));
        }
    }
}

#[derive(Clone, Debug)]
enum Op {
    Schedule { delay: u64, repeat: Option<u64> },
    Cancel(usize),
    Expedite(usize),
    Delay(usize, u64),
    Advance(u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u64..40, prop::option::weighted(0.2, 1u64..20))
            .prop_map(|(delay, repeat)| Op::Schedule { delay, repeat }),
        2 => any::<usize>().prop_map(Op::Cancel),
        1 => any::<usize>().prop_map(Op::Expedite),
        1 => (any::<usize>(), 0u64..30).prop_map(|(i, d)| Op::Delay(i, d)),
        3 => (0u64..15).prop_map(Op::Advance),
    ]
}

proptest! {
    #[test]
    fn gauge_equals_scheduled_count(ops in prop::collection::vec(arb_op(), 1..120)) {
        let (sched, clock) = setup();
        let audit = Arc::new(GaugeAudit {
            events: Mutex::new(Vec::new()),
            mismatches: Mutex::new(Vec::new()),
        });
        sched.add_fire_observer(audit.clone());

        for op in ops {
            let events = audit.events.lock().clone();
            let pick = |i: usize| events.get(i % events.len().max(1)).cloned();
            match op {
                Op::Schedule { delay, repeat } => {
                    let mut b = Event::builder(|_| Ok(()));
                    if let Some(every) = repeat {
                        b = b.repeat_every(ms(every));
                    }
                    let e = b.build();
                    audit.events.lock().push(Arc::clone(&e));
                    sched.schedule_event(&e, Some(ms(delay))).unwrap();
                }
                Op::Cancel(i) => {
                    if let Some(e) = pick(i) {
                        sched.cancel_event(&e);
                    }
                }
                Op::Expedite(i) => {
                    if let Some(e) = pick(i) {
                        sched.expedite_event(&e);
                    }
                }
                Op::Delay(i, d) => {
                    if let Some(e) = pick(i) {
                        sched.delay_event(&e, ms(d));
                    }
                }
                Op::Advance(d) => {
                    clock.advance(ms(d));
                    sched.dispatch_due();
                }
            }

            let scheduled = audit
                .events
                .lock()
                .iter()
                .filter(|e| e.state() == EventState::Scheduled)
                .count();
            prop_assert_eq!(sched.queue_size(), scheduled);
            sched.queue().check_invariants();
        }
        let mismatches = audit.mismatches.lock().clone();
        prop_assert!(mismatches.is_empty(), "gauge mismatches: {:?}", mismatches);
    }
}
