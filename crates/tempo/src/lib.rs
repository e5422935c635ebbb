//! Tempo: a time-ordered event scheduler for game servers and simulations.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Tempo sub-crates. For most users, adding `tempo` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::time::Duration;
//! use tempo::prelude::*;
//!
//! let scheduler = Scheduler::with_system_clock(SchedulerConfig::default()).unwrap();
//!
//! // A one-shot event that fires immediately.
//! let greet = Event::builder(|ctx| {
//!     assert!(ctx.latency() < Duration::from_secs(1));
//!     Ok(())
//! })
//! .requestor(RequestorId(7))
//! .kind(EventKind::new("greet"))
//! .build();
//!
//! let notices = greet.subscribe();
//! scheduler.schedule_event(&greet, None).unwrap();
//! assert_eq!(scheduler.pending_for(RequestorId(7)), 1);
//!
//! // Drive one dispatch cycle by hand; `DispatchRuntime` does this on a
//! // background thread.
//! let report = scheduler.dispatch_due();
//! assert_eq!(report.executed, 1);
//! assert_eq!(greet.state(), EventState::Completed);
//!
//! let seen: Vec<EventNotice> = notices.try_iter().collect();
//! assert!(seen.last().unwrap().is_terminal());
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tempo-core` | IDs, event states, errors, `Clock` and `MetricSink` |
//! | [`engine`] | `tempo-engine` | Events, queue, requestor index, scheduler, dispatch runtime |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`tempo-core`).
///
/// Contains [`types::EventId`], [`types::RequestorId`], the
/// [`types::EventState`] table, the error types, and the
/// [`types::Clock`] and [`types::MetricSink`] seams.
pub use tempo_core as types;

/// The scheduling engine (`tempo-engine`).
///
/// [`engine::Scheduler`] for producers, [`engine::DispatchRuntime`] for the
/// background dispatch thread, and [`engine::EventQueue`] for direct queue
/// access.
pub use tempo_engine as engine;

/// Common imports for typical Tempo usage.
///
/// ```rust
/// use tempo::prelude::*;
/// ```
///
/// This imports the scheduler, event builder, runtime, the core ID and
/// state types, and the error types returned by scheduling calls.
pub mod prelude {
    // Core types and traits
    pub use tempo_core::{Clock, EventId, EventKind, EventState, RequestorId, SystemClock};

    // Errors
    pub use tempo_core::{ActionError, FaultKind, ScheduleError};

    // Engine
    pub use tempo_engine::{
        Action, ConfigError, DispatchRuntime, Event, EventNotice, ExecutionContext,
        FireObserver, FiredNotice, Scheduler, SchedulerConfig, SchedulerMetrics,
        ShutdownReport,
    };
}
