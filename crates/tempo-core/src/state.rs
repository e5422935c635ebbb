//! Event lifecycle states and the transition table.
//!
//! ```text
//! Created ──► Scheduled ──► Executing ──► Completed
//!               │  ▲           │
//!               │  └─ repeat ──┤
//!               ▼              │
//!           Cancelled ◄────────┘
//! ```
//!
//! `Executing` is the transient window between the dispatch loop's
//! re-validation of an extracted event and the end of its action.
//! `Cancelled` and `Completed` are terminal.

use std::fmt;

/// Lifecycle state of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventState {
    /// Built but never handed to a scheduler.
    Created = 0,
    /// Pending in a scheduler queue (or extracted and awaiting re-validation).
    Scheduled = 1,
    /// Its action is running on the dispatch loop.
    Executing = 2,
    /// Cancelled before its next execution. Terminal.
    Cancelled = 3,
    /// Fired for the last time. Terminal.
    Completed = 4,
}

impl EventState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Whether the event still holds a place in a scheduler
    /// (queued, in hand, or running).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::Executing)
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// Every state change in the engine is checked against this table.
    pub fn can_transition(self, to: EventState) -> bool {
        use EventState::*;
        matches!(
            (self, to),
            (Created, Scheduled)
                | (Scheduled, Executing)
                | (Scheduled, Cancelled)
                | (Executing, Scheduled)
                | (Executing, Completed)
                | (Executing, Cancelled)
        )
    }

    /// Decode the `repr(u8)` form. Unknown values map to `None`.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Created),
            1 => Some(Self::Scheduled),
            2 => Some(Self::Executing),
            3 => Some(Self::Cancelled),
            4 => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Scheduled => "scheduled",
            Self::Executing => "executing",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::EventState::*;
    use super::*;

    const ALL: [EventState; 5] = [Created, Scheduled, Executing, Cancelled, Completed];

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Cancelled, Completed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn created_only_moves_to_scheduled() {
        for to in ALL {
            assert_eq!(Created.can_transition(to), to == Scheduled);
        }
    }

    #[test]
    fn repeat_path_is_legal() {
        assert!(Scheduled.can_transition(Executing));
        assert!(Executing.can_transition(Scheduled));
        assert!(Executing.can_transition(Completed));
    }

    #[test]
    fn scheduled_cannot_complete_without_executing() {
        assert!(!Scheduled.can_transition(Completed));
    }

    #[test]
    fn u8_roundtrip() {
        for s in ALL {
            assert_eq!(EventState::from_u8(s as u8), Some(s));
        }
        assert_eq!(EventState::from_u8(200), None);
    }

    #[test]
    fn active_states() {
        assert!(Scheduled.is_active());
        assert!(Executing.is_active());
        assert!(!Created.is_active());
        assert!(!Completed.is_active());
    }
}
