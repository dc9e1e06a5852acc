//! Load/save orchestration.
//!
//! [`Repository`] drives the aggregate engine against an [`EventStore`] and
//! a [`Codec`]: `get` replays a stream (optionally fast-forwarded from the
//! newest snapshot) into a fresh [`Root`], `save` appends the uncommitted
//! suffix and manages the snapshot side-stream.

use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    aggregate::{Aggregate, LoadError, Root},
    codec::{Codec, JsonCodec},
    event::{EventDecodeError, EventSet, Recorded},
    snapshot::{SnapshotError, SnapshotMode, SnapshotPolicy},
    store::{AppendError, ConcurrencyConflict, DEFAULT_LIMIT, EventStore, StoredEvent},
};

/// Name of the snapshot side-stream for a given main stream.
#[must_use]
pub fn snapshot_stream(name: &str) -> String {
    format!("{name}_Snapshot")
}

/// Error returned by [`Repository::get`].
#[derive(Debug, Error)]
pub enum GetError<StoreError, CodecError>
where
    StoreError: std::error::Error + 'static,
    CodecError: std::error::Error + 'static,
{
    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// A stored event could not be decoded (unknown tag or bad payload).
    #[error("failed to decode stored event: {0}")]
    Event(#[source] EventDecodeError<CodecError>),
    /// The stored snapshot could not be restored.
    #[error("failed to restore snapshot: {0}")]
    Snapshot(#[source] SnapshotError<CodecError>),
    /// The stream's records do not form a replayable sequence.
    #[error("stored stream is not replayable: {0}")]
    Replay(#[source] LoadError),
}

/// Error returned by [`Repository::save`].
#[derive(Debug, Error)]
pub enum SaveError<StoreError, CodecError>
where
    StoreError: std::error::Error + 'static,
    CodecError: std::error::Error + 'static,
{
    /// Another writer appended to the stream first; re-fetch and retry.
    #[error(transparent)]
    Conflict(ConcurrencyConflict),
    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// An event or snapshot payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Codec(#[source] CodecError),
}

impl<StoreError, CodecError> SaveError<StoreError, CodecError>
where
    StoreError: std::error::Error + 'static,
    CodecError: std::error::Error + 'static,
{
    fn from_append(error: AppendError<StoreError>) -> Self {
        match error {
            AppendError::Conflict(conflict) => Self::Conflict(conflict),
            AppendError::Store(error) => Self::Store(error),
        }
    }
}

/// Orchestrates aggregate loading and saving against a store and a codec.
///
/// Reads page through the stream in [`DEFAULT_LIMIT`]-sized batches; writes
/// append the main stream first and the snapshot record second, so a crash
/// between the two can only lose a snapshot, never reference events that
/// were not made durable.
#[derive(Debug, Clone)]
pub struct Repository<S, C = JsonCodec> {
    store: S,
    codec: C,
    page_size: usize,
    snapshot_policy: SnapshotPolicy,
}

impl<S: EventStore> Repository<S> {
    /// Create a repository over `store` with the JSON codec, a page size of
    /// [`DEFAULT_LIMIT`], and the [`SnapshotPolicy::Always`] policy.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            codec: JsonCodec,
            page_size: DEFAULT_LIMIT,
            snapshot_policy: SnapshotPolicy::default(),
        }
    }
}

impl<S: EventStore, C: Codec> Repository<S, C> {
    /// Replace the payload codec.
    #[must_use]
    pub fn with_codec<C2: Codec>(self, codec: C2) -> Repository<S, C2> {
        Repository {
            store: self.store,
            codec,
            page_size: self.page_size,
            snapshot_policy: self.snapshot_policy,
        }
    }

    /// Set the replay page size (clamped to at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the snapshot write policy.
    #[must_use]
    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = policy;
        self
    }

    /// The underlying event store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Load the aggregate stored under `name`.
    ///
    /// Starts from the newest snapshot when the aggregate type opted into
    /// snapshotting and one exists, then replays the remaining events page
    /// by page. An unknown name yields a pristine instance.
    ///
    /// # Errors
    ///
    /// Returns [`GetError::Store`] if the store fails, [`GetError::Event`]
    /// or [`GetError::Snapshot`] if a stored record cannot be decoded, and
    /// [`GetError::Replay`] if the stream's ids do not form the expected
    /// contiguous sequence.
    #[tracing::instrument(skip(self))]
    pub async fn get<A>(&self, name: &str) -> Result<Root<A>, GetError<S::Error, C::Error>>
    where
        A: Aggregate,
    {
        let mut root = Root::<A>::new();
        let mut cursor: Option<u64> = None;

        if A::Snapshots::ENABLED {
            let newest = self
                .store
                .get_backwards(&snapshot_stream(name), 1)
                .await
                .map_err(GetError::Store)?;
            if let Some(record) = newest.first() {
                A::Snapshots::restore(&mut root, record, &self.codec)
                    .map_err(GetError::Snapshot)?;
                cursor = Some(record.position + 1);
                tracing::debug!(last_event_id = record.position, "snapshot restored");
            }
        }

        loop {
            let page = self
                .store
                .get(name, cursor, self.page_size)
                .await
                .map_err(GetError::Store)?;
            let Some(last) = page.last() else {
                break;
            };
            let next_cursor = last.position + 1;
            let full_page = page.len() == self.page_size;

            let mut batch = Vec::with_capacity(page.len());
            for record in &page {
                let event = A::Event::decode(&record.kind, &record.data, &self.codec)
                    .map_err(GetError::Event)?;
                batch.push(Recorded {
                    id: record.position,
                    event,
                });
            }
            root.load(batch).map_err(GetError::Replay)?;

            if !full_page {
                break;
            }
            cursor = Some(next_cursor);
        }

        tracing::debug!(events = root.history().len(), "aggregate loaded");
        Ok(root)
    }

    /// Persist the aggregate's uncommitted events under `name`.
    ///
    /// A no-op when nothing is uncommitted. Otherwise appends the encoded
    /// events to the main stream and clears the uncommitted suffix. For
    /// snapshot-capable aggregates, when the policy accepts, one snapshot
    /// record is then appended to `<name>_Snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::Conflict`] when another writer took one of the
    /// batch positions (re-fetch and retry at the call site),
    /// [`SaveError::Store`] if the store fails, and [`SaveError::Codec`] if
    /// a payload cannot be encoded.
    #[tracing::instrument(skip(self, root))]
    pub async fn save<A>(
        &self,
        name: &str,
        root: &mut Root<A>,
    ) -> Result<(), SaveError<S::Error, C::Error>>
    where
        A: Aggregate,
    {
        let mut records = Vec::with_capacity(root.uncommitted_events().len());
        for recorded in root.uncommitted_events() {
            records.push(StoredEvent {
                position: recorded.id,
                kind: recorded.event.kind().to_string(),
                data: recorded
                    .event
                    .encode(&self.codec)
                    .map_err(SaveError::Codec)?,
            });
        }
        let Some(records) = NonEmpty::from_vec(records) else {
            return Ok(());
        };
        let appended = records.len();

        self.store
            .append(name, records)
            .await
            .map_err(SaveError::from_append)?;
        root.mark_committed();
        tracing::debug!(appended, "uncommitted events persisted");

        if A::Snapshots::ENABLED
            && self
                .snapshot_policy
                .should_snapshot(root.events_since_snapshot())
        {
            if let Some(record) = A::Snapshots::capture(root, &self.codec)
                .map_err(SaveError::Codec)?
            {
                let last_event_id = record.position;
                self.store
                    .append(&snapshot_stream(name), NonEmpty::singleton(record))
                    .await
                    .map_err(SaveError::from_append)?;
                root.record_snapshot(last_event_id);
                tracing::debug!(last_event_id, "snapshot stored");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn snapshot_stream_appends_the_suffix() {
        assert_eq!(snapshot_stream("order-17"), "order-17_Snapshot");
    }

    #[test]
    fn save_error_conflict_is_transparent() {
        let error: SaveError<std::io::Error, std::io::Error> =
            SaveError::Conflict(ConcurrencyConflict::AlreadyExists {
                stream: "orders".to_string(),
                position: 4,
            });
        assert!(error.to_string().contains("concurrency conflict"));
        assert!(error.source().is_none());
    }

    #[test]
    fn get_error_store_has_source() {
        let error: GetError<std::io::Error, std::io::Error> =
            GetError::Store(std::io::Error::other("backend down"));
        assert!(error.source().is_some());
    }

    #[test]
    fn get_error_replay_mentions_the_stream_problem() {
        let error: GetError<std::io::Error, std::io::Error> =
            GetError::Replay(LoadError::OutOfSequence {
                expected: 2,
                found: 5,
            });
        let msg = error.to_string();
        assert!(msg.contains("not replayable"));
    }
}
