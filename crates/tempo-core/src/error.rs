//! Error types for the Tempo event scheduler.
//!
//! Organized by who observes them:
//!
//! | Type | Raised by | Surfaced to |
//! |------|-----------|-------------|
//! | [`ScheduleError`] | public scheduler methods | the calling producer |
//! | [`ActionError`] | an event's action | the dispatch loop (logged, never propagated) |
//! | [`FaultKind`] | the dispatch loop | fire observers and event subscribers |
//!
//! State conflicts (cancelling a finished event, delaying an unscheduled
//! one) are not errors: those operations return `false`.

use thiserror::Error;

/// Errors returned synchronously by scheduling operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The event cannot be scheduled in its current form, e.g. it was
    /// already handed to a scheduler.
    #[error("invalid event: {reason}")]
    InvalidEvent {
        /// Description of what was wrong with the event.
        reason: String,
    },
    /// The requestor ID is the reserved value zero.
    #[error("requestor id 0 is reserved")]
    InvalidRequestor,
    /// The queue already holds `capacity` pending events.
    #[error("event queue full (capacity {capacity})")]
    QueueFull {
        /// The configured capacity.
        capacity: usize,
    },
    /// The deferred-insert channel is full (back-pressure).
    #[error("deferred schedule channel full")]
    ChannelFull,
    /// The scheduler's stop signal has been triggered.
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Failure reported by an event's action.
///
/// Actions return this instead of panicking; the dispatch loop treats
/// both the same way (log, force the event to `Completed`, continue).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The action could not complete.
    #[error("action failed: {reason}")]
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The world state the action depends on is gone (entity despawned,
    /// session closed).
    #[error("action target missing: {target}")]
    TargetMissing {
        /// Description of the missing target.
        target: String,
    },
}

impl ActionError {
    /// Shorthand for [`ActionError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// How an execution faulted.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FaultKind {
    /// The action returned an error.
    #[error(transparent)]
    Failed(#[from] ActionError),
    /// The action panicked; carries the panic message when it was a string.
    #[error("action panicked: {message}")]
    Panicked {
        /// The panic payload rendered as text.
        message: String,
    },
}
