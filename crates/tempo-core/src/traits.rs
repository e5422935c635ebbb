//! Core abstraction traits for time and metric publication.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of "now" for the scheduler.
///
/// Injected so that deterministic tests can advance virtual time instead
/// of sleeping. Implementations must be monotonic: `now()` never goes
/// backwards.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Destination for scheduler telemetry.
///
/// The engine only produces values; shipping them to a metrics backend
/// is the sink's job. Implementations must not block.
pub trait MetricSink: Send + Sync {
    /// Record the current value of a named gauge.
    fn gauge(&self, name: &'static str, value: u64);

    /// Record one observation of a named timing, tagged by event kind.
    fn timing(&self, name: &'static str, kind: &'static str, value: Duration);
}

impl<T: MetricSink + ?Sized> MetricSink for Arc<T> {
    fn gauge(&self, name: &'static str, value: u64) {
        (**self).gauge(name, value)
    }

    fn timing(&self, name: &'static str, kind: &'static str, value: Duration) {
        (**self).timing(name, kind, value)
    }
}
