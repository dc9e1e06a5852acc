//! Snapshot support for optimised aggregate loading.
//!
//! A snapshot is the materialized aggregate state at a given event id.
//! Aggregates opt in via [`Snapshotting`] and select [`WithSnapshots`] as
//! their capability marker; everything else declares [`NoSnapshots`]. The
//! repository consults the marker (never the runtime type) to decide
//! whether to touch the snapshot side-stream, and [`SnapshotPolicy`] decides
//! how often a new snapshot is actually written.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    aggregate::{Aggregate, Root},
    codec::Codec,
    store::StoredEvent,
};

/// Materialized aggregate state at a point in the event stream.
///
/// `last_event_id` is the id of the last event folded into `state`; loading
/// resumes replay at `last_event_id + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<S> {
    /// The captured state.
    pub state: S,
    /// Id of the last event covered by this snapshot.
    pub last_event_id: u64,
}

/// State types that can be persisted as snapshot records.
///
/// [`Self::KIND`] is the stored type tag and doubles as the per-aggregate
/// snapshot version: bump it when the state shape changes and stale records
/// are rejected on restore instead of decoding into garbage.
pub trait SnapshotState: Serialize + DeserializeOwned {
    /// Stored type tag of this snapshot state.
    const KIND: &'static str;
}

/// Opt-in snapshot capability for an aggregate type.
pub trait Snapshotting: Aggregate {
    /// The explicit state captured into snapshots.
    type State: SnapshotState;

    /// Materialize the current state.
    fn capture(&self) -> Self::State;

    /// Replace the current state with a previously captured one.
    fn restore(&mut self, state: Self::State);
}

/// Error returned when restoring a stored snapshot fails.
#[derive(Debug, Error)]
pub enum SnapshotError<CodecError> {
    /// The stored record carries a different state shape than this
    /// aggregate type expects.
    #[error("snapshot record has kind `{found}`, expected `{expected}`")]
    KindMismatch {
        /// The tag this aggregate's state declares.
        expected: &'static str,
        /// The tag found on the stored record.
        found: String,
    },
    /// The payload failed to deserialize into the expected state shape.
    #[error("failed to decode snapshot payload: {0}")]
    Codec(#[source] CodecError),
}

/// Marker for aggregates that do not participate in snapshotting.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSnapshots;

/// Marker enabling the snapshot fast path.
///
/// Only available to aggregates that implement [`Snapshotting`]; declaring
/// it without the implementation is a compile error, so a missing capability
/// is caught when the aggregate type is defined, not at dispatch time.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithSnapshots;

/// Sealed capability strategy consulted by the repository.
///
/// Cannot be implemented outside this crate; [`NoSnapshots`] and
/// [`WithSnapshots`] are the only strategies.
pub trait SnapshotMode<A: Aggregate>: private::Sealed {
    /// Whether the repository should touch the snapshot side-stream at all.
    const ENABLED: bool;

    /// Capture the current state as a storable record.
    ///
    /// The record's position is the id of the last event the snapshot
    /// covers. Returns `Ok(None)` when there is nothing to capture.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the state cannot be serialized.
    fn capture<C: Codec>(root: &Root<A>, codec: &C) -> Result<Option<StoredEvent>, C::Error>;

    /// Restore state from a stored snapshot record.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::KindMismatch`] if the record's tag does not
    /// match the aggregate's state shape, or [`SnapshotError::Codec`] if the
    /// payload fails to deserialize.
    fn restore<C: Codec>(
        root: &mut Root<A>,
        record: &StoredEvent,
        codec: &C,
    ) -> Result<(), SnapshotError<C::Error>>;
}

impl<A: Aggregate> SnapshotMode<A> for NoSnapshots {
    const ENABLED: bool = false;

    fn capture<C: Codec>(_root: &Root<A>, _codec: &C) -> Result<Option<StoredEvent>, C::Error> {
        Ok(None)
    }

    fn restore<C: Codec>(
        _root: &mut Root<A>,
        _record: &StoredEvent,
        _codec: &C,
    ) -> Result<(), SnapshotError<C::Error>> {
        unreachable!("snapshot restore on an aggregate without snapshot support")
    }
}

impl<A: Snapshotting> SnapshotMode<A> for WithSnapshots {
    const ENABLED: bool = true;

    fn capture<C: Codec>(root: &Root<A>, codec: &C) -> Result<Option<StoredEvent>, C::Error> {
        let Some(snapshot) = root.capture_snapshot() else {
            return Ok(None);
        };
        Ok(Some(StoredEvent {
            position: snapshot.last_event_id,
            kind: A::State::KIND.to_string(),
            data: codec.serialize(&snapshot.state)?,
        }))
    }

    fn restore<C: Codec>(
        root: &mut Root<A>,
        record: &StoredEvent,
        codec: &C,
    ) -> Result<(), SnapshotError<C::Error>> {
        if record.kind != A::State::KIND {
            return Err(SnapshotError::KindMismatch {
                expected: A::State::KIND,
                found: record.kind.clone(),
            });
        }
        let state: A::State = codec.deserialize(&record.data).map_err(SnapshotError::Codec)?;
        root.restore_snapshot(Snapshot {
            state,
            last_event_id: record.position,
        });
        Ok(())
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::NoSnapshots {}
    impl Sealed for super::WithSnapshots {}
}

/// Policy deciding when the repository writes a new snapshot record.
///
/// - [`SnapshotPolicy::Always`]: one snapshot per save: minimal replay,
///   highest storage cost. This is the default.
/// - [`SnapshotPolicy::EveryNEvents`]: snapshot once at least N events have
///   accumulated past the previous one.
/// - [`SnapshotPolicy::Never`]: load-only mode; existing snapshots are still
///   used on read, new ones are never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Write a snapshot on every save.
    Always,
    /// Write a snapshot once at least N events accumulated past the last one.
    EveryNEvents(u64),
    /// Never write snapshots.
    Never,
}

impl SnapshotPolicy {
    /// Whether a snapshot should be written given the number of events
    /// applied since the last one.
    #[must_use]
    pub const fn should_snapshot(&self, events_since: u64) -> bool {
        match self {
            Self::Always => true,
            Self::EveryNEvents(threshold) => events_since >= *threshold,
            Self::Never => false,
        }
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::Always
    }
}
