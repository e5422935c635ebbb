//! Reusable firing-log fixture.
//!
//! Actions under test push a labelled [`FireRecord`] into a shared
//! [`FireLog`]; assertions then read back order, counts, and times.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// One recorded firing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FireRecord {
    pub label: String,
    pub at: Instant,
}

/// Shared, cloneable log of firings.
///
/// Clones share the same underlying buffer, so a clone can be moved
/// into each action closure.
#[derive(Clone, Default)]
pub struct FireLog {
    records: Arc<Mutex<Vec<FireRecord>>>,
}

impl FireLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a firing.
    pub fn record(&self, label: impl Into<String>, at: Instant) {
        self.records.lock().push(FireRecord {
            label: label.into(),
            at,
        });
    }

    /// Labels in firing order.
    pub fn labels(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.label.clone()).collect()
    }

    /// Number of firings with the given label.
    pub fn count(&self, label: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.label == label)
            .count()
    }

    /// Firing times of `label`, as offsets from `origin`.
    pub fn offsets(&self, label: &str, origin: Instant) -> Vec<Duration> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.label == label)
            .map(|r| r.at.saturating_duration_since(origin))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
