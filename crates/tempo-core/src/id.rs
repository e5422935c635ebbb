//! Strongly-typed identifiers for events, requestors, and event kinds.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`EventId`] allocation.
static EVENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique identifier of a schedulable event.
///
/// Allocated from a monotonic atomic counter via [`EventId::next`].
/// Two events never share an ID within one process, so the queue can
/// key its positional index by ID without ABA concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// Allocate a fresh, unique event ID. Thread-safe.
    pub fn next() -> Self {
        Self(EVENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value, for logging and telemetry tags.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical owner of scheduled events, typically a connected player.
///
/// `RequestorId(0)` is reserved: it is rejected wherever a requestor
/// is required, and an event with no owner uses `None` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestorId(pub u64);

impl RequestorId {
    /// Whether this ID may be used as an owner (non-zero).
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RequestorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestorId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Type tag of an event, e.g. `"movement"` or `"combat_round"`.
///
/// Used for filtered bulk cancellation and as a telemetry tag. Kinds
/// are compared by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(&'static str);

impl EventKind {
    /// Kind assigned to events built without an explicit tag.
    pub const GENERIC: EventKind = EventKind("generic");

    /// Create a kind from a static name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The kind's name.
    pub fn name(self) -> &'static str {
        self.0
    }
}

impl Default for EventKind {
    fn default() -> Self {
        Self::GENERIC
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
