//! Outbound "event fired" hook and its metric adapter.
//!
//! After every execution the dispatch loop builds a [`FiredNotice`] and
//! hands it to each registered [`FireObserver`]. [`TelemetryObserver`]
//! turns notices into gauge and timing observations on a
//! [`MetricSink`]; [`ChannelObserver`] forwards them to another thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tempo_core::{FaultKind, MetricSink};

use crate::event::Event;

/// Gauge: events in the `Scheduled` state after the firing.
pub const QUEUE_SIZE: &str = "scheduler.queue_size";
/// Timing: how late the firing was relative to its due time.
pub const EVENT_PROCESSING_TIME: &str = "scheduler.event_processing_time";
/// Timing: how long the action ran.
pub const EVENT_EXECUTION_TIME: &str = "scheduler.event_execution_time";

/// How a firing ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FireOutcome {
    /// Repeating event queued again.
    Rescheduled {
        /// Its next due time.
        next_fire_at: Instant,
    },
    /// Finished; no further firings.
    Completed,
    /// A repeating event was cancelled while this run was in progress.
    CancelledDuringRun,
    /// The action failed or panicked; the event is `Completed`.
    Faulted(FaultKind),
}

/// Description of one execution, delivered to fire observers.
#[derive(Clone, Debug)]
pub struct FiredNotice {
    /// The event that fired.
    pub event: Arc<Event>,
    /// Scheduled events remaining after this firing was settled.
    pub queue_size: usize,
    /// Dispatch time minus due time.
    pub latency: Duration,
    /// Wall-clock time spent in the action.
    pub execution_time: Duration,
    /// What happened to the event afterwards.
    pub outcome: FireOutcome,
}

/// Listener for executed events.
///
/// Called on the dispatch thread after the event's state has settled.
/// Must be cheap and must not block; forward to a channel for heavy work.
pub trait FireObserver: Send + Sync {
    /// Observe one firing.
    fn on_fired(&self, notice: &FiredNotice);
}

/// Publishes firings to a [`MetricSink`].
pub struct TelemetryObserver<S> {
    sink: S,
}

impl<S: MetricSink> TelemetryObserver<S> {
    /// Wrap `sink`.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: MetricSink> FireObserver for TelemetryObserver<S> {
    fn on_fired(&self, notice: &FiredNotice) {
        let kind = notice.event.kind().name();
        self.sink.gauge(QUEUE_SIZE, notice.queue_size as u64);
        self.sink.timing(EVENT_PROCESSING_TIME, kind, notice.latency);
        self.sink
            .timing(EVENT_EXECUTION_TIME, kind, notice.execution_time);
    }
}

/// Forwards every notice into an unbounded channel.
///
/// Notices are dropped silently once the receiver is gone.
pub struct ChannelObserver {
    tx: Sender<FiredNotice>,
}

impl ChannelObserver {
    /// Create the observer and the receiving end.
    pub fn new() -> (Self, Receiver<FiredNotice>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl FireObserver for ChannelObserver {
    fn on_fired(&self, notice: &FiredNotice) {
        let _ = self.tx.send(notice.clone());
    }
}
