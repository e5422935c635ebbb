//! Core types and traits for the Tempo event scheduler.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Tempo workspace:
//! event identifiers, the event state table, error types, and the
//! [`Clock`] and [`MetricSink`] traits.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod state;
pub mod traits;

pub use error::{ActionError, FaultKind, ScheduleError};
pub use id::{EventId, EventKind, RequestorId};
pub use state::EventState;
pub use traits::{Clock, MetricSink, SystemClock};
