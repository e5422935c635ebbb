//! Test utilities and deterministic doubles for Tempo development.
//!
//! Provides a virtual-time [`ManualClock`], a [`RecordingSink`] that
//! captures telemetry, and the [`FireLog`] fixture for asserting which
//! events fired and when.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{FireLog, FireRecord};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempo_core::{Clock, MetricSink};

/// Virtual-time [`Clock`] that only moves when told to.
///
/// `now()` is `origin + elapsed`, where `elapsed` starts at zero and is
/// advanced explicitly. Lets tests walk through "220 ms" of scheduling
/// without sleeping.
pub struct ManualClock {
    origin: Instant,
    elapsed_ns: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_ns: AtomicU64::new(0),
        }
    }

    /// Convenience for the common `Arc<ManualClock>` shape.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Move virtual time forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.elapsed_ns
            .fetch_add(duration_nanos(by), Ordering::AcqRel);
    }

    /// Jump to `elapsed` since origin. Never moves time backwards.
    pub fn set_elapsed(&self, elapsed: Duration) {
        self.elapsed_ns
            .fetch_max(duration_nanos(elapsed), Ordering::AcqRel);
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }

    /// The instant corresponding to virtual time zero.
    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// The instant `offset` after the origin.
    pub fn at(&self, offset: Duration) -> Instant {
        self.origin + offset
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// A single metric observation captured by [`RecordingSink`].
#[derive(Clone, Debug, PartialEq)]
pub enum MetricRecord {
    Gauge {
        name: &'static str,
        value: u64,
    },
    Timing {
        name: &'static str,
        kind: &'static str,
        value: Duration,
    },
}

/// [`MetricSink`] that keeps every observation in memory.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<MetricRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All observations so far, in arrival order.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().clone()
    }

    /// Every value recorded for the named gauge.
    pub fn gauge_values(&self, name: &str) -> Vec<u64> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                MetricRecord::Gauge { name: n, value } if *n == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Every timing recorded under `name`, as `(kind, value)` pairs.
    pub fn timings(&self, name: &str) -> Vec<(&'static str, Duration)> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                MetricRecord::Timing {
                    name: n,
                    kind,
                    value,
                } if *n == name => Some((*kind, *value)),
                _ => None,
            })
            .collect()
    }
}

impl MetricSink for RecordingSink {
    fn gauge(&self, name: &'static str, value: u64) {
        self.records.lock().push(MetricRecord::Gauge { name, value });
    }

    fn timing(&self, name: &'static str, kind: &'static str, value: Duration) {
        self.records
            .lock()
            .push(MetricRecord::Timing { name, kind, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_at_origin() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), clock.origin());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_millis(50));
        clock.advance(Duration::from_millis(25));
        assert_eq!(clock.elapsed(), Duration::from_millis(75));
        assert_eq!(clock.now(), clock.at(Duration::from_millis(75)));
    }

    #[test]
    fn set_elapsed_never_rewinds() {
        let clock = ManualClock::new();
        clock.set_elapsed(Duration::from_millis(100));
        clock.set_elapsed(Duration::from_millis(40));
        assert_eq!(clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn recording_sink_filters_by_name() {
        let sink = RecordingSink::new();
        sink.gauge("queue", 3);
        sink.gauge("other", 9);
        sink.timing("latency", "movement", Duration::from_millis(2));
        assert_eq!(sink.gauge_values("queue"), vec![3]);
        assert_eq!(
            sink.timings("latency"),
            vec![("movement", Duration::from_millis(2))]
        );
        assert_eq!(sink.records().len(), 3);
    }
}
