//! The aggregate engine.
//!
//! [`Root`] wraps an application-defined [`Aggregate`] and owns its event
//! history: raising assigns sequence ids and queues events as uncommitted,
//! loading replays stored events after validating their ids. The engine
//! never touches storage; the repository drives it.

use thiserror::Error;

use crate::{
    event::{EventSet, Recorded},
    snapshot::{Snapshot, SnapshotMode, Snapshotting},
};

/// An event-sourced entity.
///
/// The implementing type holds the derived state; the engine folds events
/// into it through [`apply`](Self::apply). Dispatch is an exhaustive match
/// over the event sum type, so every variant has exactly one handler and an
/// unhandled variant fails at compile time rather than at runtime.
pub trait Aggregate: Default {
    /// The aggregate's event sum type.
    type Event: EventSet;

    /// Snapshot capability marker: [`NoSnapshots`](crate::snapshot::NoSnapshots)
    /// for replay-only aggregates, [`WithSnapshots`](crate::snapshot::WithSnapshots)
    /// for aggregates that also implement [`Snapshotting`].
    type Snapshots: SnapshotMode<Self>;

    /// Fold one event into the derived state.
    fn apply(&mut self, event: &Self::Event);
}

/// Error returned by [`Root::load`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Load was called while raised events were still awaiting a save.
    #[error("cannot load with {pending} uncommitted event(s) pending; save them first")]
    UncommittedPending {
        /// Number of events in the uncommitted suffix.
        pending: usize,
    },
    /// The batch ids were not exactly the expected contiguous sequence.
    #[error("event id {found} is out of sequence, expected {expected}")]
    OutOfSequence {
        /// The id the engine expected next.
        expected: u64,
        /// The id actually found in the batch.
        found: u64,
    },
}

/// Aggregate instance plus its event log bookkeeping.
///
/// `history` holds every applied event in id order; the uncommitted events
/// are the suffix of `history` past the `committed` watermark, so the
/// "uncommitted is a suffix of history" invariant holds by construction.
pub struct Root<A: Aggregate> {
    aggregate: A,
    history: Vec<Recorded<A::Event>>,
    committed: usize,
    /// Last event id covered by a restored or stored snapshot, if any.
    snapshot_floor: Option<u64>,
}

impl<A: Aggregate> Default for Root<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> Root<A> {
    /// Create an empty instance with no history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            aggregate: A::default(),
            history: Vec::new(),
            committed: 0,
            snapshot_floor: None,
        }
    }

    /// The derived state.
    #[must_use]
    pub fn state(&self) -> &A {
        &self.aggregate
    }

    /// Every applied event, in id order.
    #[must_use]
    pub fn history(&self) -> &[Recorded<A::Event>] {
        &self.history
    }

    /// Events raised since the last successful save or load.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[Recorded<A::Event>] {
        &self.history[self.committed..]
    }

    /// Id of the most recently applied event, falling back to the snapshot
    /// floor when the instance was restored and nothing has been replayed.
    #[must_use]
    pub fn last_event_id(&self) -> Option<u64> {
        self.history
            .last()
            .map(|recorded| recorded.id)
            .or(self.snapshot_floor)
    }

    /// Raise a new domain event.
    ///
    /// Assigns the next sequence id, applies the event to the derived state,
    /// and queues it as uncommitted until the repository persists it.
    pub fn raise(&mut self, event: A::Event) {
        let id = self.next_event_id();
        tracing::trace!(id, kind = event.kind(), "event raised");
        self.aggregate.apply(&event);
        self.history.push(Recorded { id, event });
    }

    /// Replay previously stored events.
    ///
    /// The whole batch is validated before any event is applied, so a
    /// rejected batch leaves the instance untouched. Replayed events never
    /// enter the uncommitted suffix.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UncommittedPending`] if raised events are still
    /// awaiting a save, or [`LoadError::OutOfSequence`] if the batch ids are
    /// not exactly the expected contiguous sequence.
    pub fn load(&mut self, events: Vec<Recorded<A::Event>>) -> Result<(), LoadError> {
        let pending = self.history.len() - self.committed;
        if pending > 0 {
            return Err(LoadError::UncommittedPending { pending });
        }

        let mut expected = self.next_event_id();
        for recorded in &events {
            if recorded.id != expected {
                return Err(LoadError::OutOfSequence {
                    expected,
                    found: recorded.id,
                });
            }
            expected += 1;
        }

        for recorded in events {
            self.aggregate.apply(&recorded.event);
            self.history.push(recorded);
        }
        self.committed = self.history.len();
        Ok(())
    }

    /// Next sequence id to assign.
    ///
    /// The maximum over "one past the last applied event" and "one past the
    /// snapshot floor", so ids keep increasing monotonically across a
    /// restore, with or without replayed events on top of it.
    fn next_event_id(&self) -> u64 {
        let after_history = self.history.last().map(|recorded| recorded.id + 1);
        let after_snapshot = self.snapshot_floor.map(|id| id + 1);
        after_history.max(after_snapshot).unwrap_or(0)
    }

    /// Number of applied events not yet covered by a snapshot.
    #[must_use]
    pub fn events_since_snapshot(&self) -> u64 {
        let applied = self.history.last().map_or(0, |recorded| recorded.id + 1);
        let covered = self.snapshot_floor.map_or(0, |id| id + 1);
        applied.saturating_sub(covered)
    }

    /// Mark every event as durably persisted, emptying the uncommitted
    /// suffix. Called by the repository once the main-stream append succeeds.
    pub(crate) fn mark_committed(&mut self) {
        self.committed = self.history.len();
    }

    /// Record that a snapshot covering events up to `last_event_id` was
    /// persisted.
    pub(crate) fn record_snapshot(&mut self, last_event_id: u64) {
        self.snapshot_floor = Some(last_event_id);
    }
}

impl<A: Snapshotting> Root<A> {
    /// Capture the current state as a snapshot.
    ///
    /// Returns `None` when no event has ever been applied; there is nothing
    /// worth persisting for a pristine instance.
    #[must_use]
    pub fn capture_snapshot(&self) -> Option<Snapshot<A::State>> {
        let last_event_id = self.last_event_id()?;
        Some(Snapshot {
            state: self.aggregate.capture(),
            last_event_id,
        })
    }

    /// Restore state from a snapshot and rebase id sequencing past it.
    ///
    /// Intended for freshly created instances; subsequent loads must start
    /// at `snapshot.last_event_id + 1`.
    pub fn restore_snapshot(&mut self, snapshot: Snapshot<A::State>) {
        debug_assert!(
            self.history.is_empty(),
            "snapshot restored over existing history"
        );
        self.aggregate.restore(snapshot.state);
        self.snapshot_floor = Some(snapshot.last_event_id);
    }
}
