//! Per-requestor index of owned events.
//!
//! Maps each [`RequestorId`] to the events it currently owns, in the
//! order they were scheduled. Used to answer "what does player 7 have
//! pending?" and to cancel everything a requestor owns when it
//! disconnects.
//!
//! # Lock order
//!
//! The index lock is never held while the queue lock is taken, or the
//! other way round. [`RequestorIndex::cancel_all_for`] snapshots the ids
//! and releases the index lock before invoking the cancel callback.

use indexmap::IndexMap;
use parking_lot::Mutex;
use tempo_core::{EventId, EventKind, RequestorId};

/// Requestor → owned events.
#[derive(Default)]
pub struct RequestorIndex {
    owned: Mutex<IndexMap<RequestorId, IndexMap<EventId, EventKind>>>,
}

impl RequestorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `requestor` owns `id`. Returns `false` if already recorded.
    pub fn insert(&self, requestor: RequestorId, id: EventId, kind: EventKind) -> bool {
        self.owned
            .lock()
            .entry(requestor)
            .or_default()
            .insert(id, kind)
            .is_none()
    }

    /// Forget `id`. Drops the requestor's entry once it owns nothing.
    pub fn remove(&self, requestor: RequestorId, id: EventId) -> bool {
        let mut owned = self.owned.lock();
        let Some(events) = owned.get_mut(&requestor) else {
            return false;
        };
        let removed = events.shift_remove(&id).is_some();
        if events.is_empty() {
            owned.swap_remove(&requestor);
        }
        removed
    }

    /// Ids owned by `requestor`, oldest first, optionally filtered by kind.
    pub fn snapshot(&self, requestor: RequestorId, kind: Option<EventKind>) -> Vec<EventId> {
        self.owned
            .lock()
            .get(&requestor)
            .map(|events| {
                events
                    .iter()
                    .filter(|(_, k)| kind.is_none_or(|want| **k == want))
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of events `requestor` owns.
    pub fn owned_count(&self, requestor: RequestorId) -> usize {
        self.owned
            .lock()
            .get(&requestor)
            .map_or(0, |events| events.len())
    }

    /// Number of requestors owning at least one event.
    pub fn requestor_count(&self) -> usize {
        self.owned.lock().len()
    }

    /// Total events across all requestors.
    pub fn total(&self) -> usize {
        self.owned.lock().values().map(|events| events.len()).sum()
    }

    /// Cancel every event `requestor` owns (optionally only one kind).
    ///
    /// `cancel` is called once per snapshotted id without the index lock
    /// held, and reports whether that cancel succeeded. Events that
    /// complete or are cancelled concurrently simply report `false`.
    /// Returns the number of successful cancels.
    pub fn cancel_all_for(
        &self,
        requestor: RequestorId,
        kind: Option<EventKind>,
        mut cancel: impl FnMut(EventId) -> bool,
    ) -> usize {
        self.snapshot(requestor, kind)
            .into_iter()
            .filter(|id| cancel(*id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVE: EventKind = EventKind::new("movement");
    const REGEN: EventKind = EventKind::new("regen");

    fn ids(n: usize) -> Vec<EventId> {
        (0..n).map(|_| EventId::next()).collect()
    }

    #[test]
    fn insert_and_remove() {
        let index = RequestorIndex::new();
        let r = RequestorId(7);
        let e = ids(2);
        assert!(index.insert(r, e[0], MOVE));
        assert!(!index.insert(r, e[0], MOVE));
        assert!(index.insert(r, e[1], REGEN));
        assert_eq!(index.owned_count(r), 2);
        assert!(index.remove(r, e[0]));
        assert!(!index.remove(r, e[0]));
        assert!(index.remove(r, e[1]));
        assert_eq!(index.requestor_count(), 0);
    }

    #[test]
    fn snapshot_preserves_schedule_order() {
        let index = RequestorIndex::new();
        let r = RequestorId(1);
        let e = ids(4);
        for id in &e {
            index.insert(r, *id, MOVE);
        }
        index.remove(r, e[1]);
        assert_eq!(index.snapshot(r, None), vec![e[0], e[2], e[3]]);
    }

    #[test]
    fn snapshot_filters_by_kind() {
        let index = RequestorIndex::new();
        let r = RequestorId(1);
        let e = ids(3);
        index.insert(r, e[0], MOVE);
        index.insert(r, e[1], REGEN);
        index.insert(r, e[2], MOVE);
        assert_eq!(index.snapshot(r, Some(MOVE)), vec![e[0], e[2]]);
        assert_eq!(index.snapshot(r, Some(REGEN)), vec![e[1]]);
        assert!(index.snapshot(RequestorId(2), None).is_empty());
    }

    #[test]
    fn cancel_all_counts_successes_only() {
        let index = RequestorIndex::new();
        let r = RequestorId(3);
        let e = ids(4);
        for id in &e {
            index.insert(r, *id, MOVE);
        }
        let refused = e[2];
        let mut seen = Vec::new();
        let n = index.cancel_all_for(r, None, |id| {
            seen.push(id);
            id != refused
        });
        assert_eq!(n, 3);
        assert_eq!(seen, e);
    }

    #[test]
    fn cancel_callback_may_touch_index() {
        let index = RequestorIndex::new();
        let r = RequestorId(9);
        let e = ids(2);
        index.insert(r, e[0], MOVE);
        index.insert(r, e[1], MOVE);
        // The lock is released before callbacks run.
        let n = index.cancel_all_for(r, None, |id| index.remove(r, id));
        assert_eq!(n, 2);
        assert_eq!(index.total(), 0);
    }

    #[test]
    fn requestors_are_isolated() {
        let index = RequestorIndex::new();
        let e = ids(2);
        index.insert(RequestorId(1), e[0], MOVE);
        index.insert(RequestorId(2), e[1], MOVE);
        assert_eq!(index.owned_count(RequestorId(1)), 1);
        assert_eq!(index.owned_count(RequestorId(2)), 1);
        assert_eq!(index.total(), 2);
    }
}
