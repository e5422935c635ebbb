//! Benchmark workloads and utilities for the Tempo event scheduler.
//!
//! Provides deterministic workloads for benchmarks and examples:
//!
//! - [`noop_events`]: `n` one-shot events with an empty action
//! - [`mixed_profile`]: a seeded mix of one-shots and repeaters spread over
//!   several requestors
//! - [`schedule_all`]: push a profile into a [`Scheduler`]

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;
use std::time::Duration;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempo_core::{EventKind, RequestorId, ScheduleError};
use tempo_engine::{Event, Scheduler};

/// Kinds used by [`mixed_profile`], picked round-robin by the RNG.
pub const PROFILE_KINDS: [EventKind; 4] = [
    EventKind::new("movement"),
    EventKind::new("attack"),
    EventKind::new("regen"),
    EventKind::new("spawn"),
];

/// One entry of a workload: the event and the delay to schedule it with.
#[derive(Debug, Clone)]
pub struct Planned {
    /// The event to schedule.
    pub event: Arc<Event>,
    /// Delay passed to [`Scheduler::schedule_event`].
    pub delay: Duration,
}

/// Build `n` one-shot events with an empty action and no requestor.
pub fn noop_events(n: usize) -> Vec<Arc<Event>> {
    (0..n).map(|_| Event::builder(|_| Ok(())).build()).collect()
}

/// Build a deterministic mixed workload.
///
/// `n` events spread over `requestors` requestors (IDs `1..=requestors`),
/// with delays uniform in `[0, horizon)`. Roughly one event in eight
/// repeats, with an interval of a tenth of the horizon. The same seed always
/// yields the same profile.
pub fn mixed_profile(seed: u64, n: usize, requestors: u64, horizon: Duration) -> Vec<Planned> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let horizon_us = (horizon.as_micros() as u64).max(1);
    let requestors = requestors.max(1);
    let repeat = (horizon / 10).max(Duration::from_micros(1));

    (0..n)
        .map(|_| {
            let requestor = RequestorId(rng.next_u64() % requestors + 1);
            let kind = PROFILE_KINDS[(rng.next_u64() % PROFILE_KINDS.len() as u64) as usize];
            let mut builder = Event::builder(|_| Ok(())).requestor(requestor).kind(kind);
            if rng.next_u64() % 8 == 0 {
                builder = builder.repeat_every(repeat);
            }
            Planned {
                event: builder.build(),
                delay: Duration::from_micros(rng.next_u64() % horizon_us),
            }
        })
        .collect()
}

/// Schedule every entry of `profile` on `scheduler`, stopping at the first
/// refusal.
pub fn schedule_all(scheduler: &Scheduler, profile: &[Planned]) -> Result<(), ScheduleError> {
    for planned in profile {
        scheduler.schedule_event(&planned.event, Some(planned.delay))?;
    }
    Ok(())
}
