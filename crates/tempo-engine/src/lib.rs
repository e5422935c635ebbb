//! Scheduling engine for the Tempo event scheduler.
//!
//! Holds the time-ordered [`EventQueue`], the per-requestor
//! [`RequestorIndex`], the [`Scheduler`] facade producers call into, and
//! the dispatch loop that executes due events, either driven by hand via
//! [`Scheduler::dispatch_due`] or on a background thread via
//! [`DispatchRuntime`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod metrics;
pub mod queue;
pub mod requestor;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;

pub use action::{Action, ExecutionContext};
pub use config::{ConfigError, SchedulerConfig};
pub use dispatch::{DispatchReport, StopSignal};
pub use event::{Event, EventBuilder, EventNotice};
pub use metrics::SchedulerMetrics;
pub use queue::{DueEvent, EventQueue, Finish};
pub use requestor::RequestorIndex;
pub use runtime::{DispatchRuntime, ShutdownReport};
pub use scheduler::Scheduler;
pub use telemetry::{ChannelObserver, FireObserver, FireOutcome, FiredNotice, TelemetryObserver};
