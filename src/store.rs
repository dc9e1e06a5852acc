//! Persistence layer abstractions.
//!
//! This module describes the storage contract ([`EventStore`]), the stored
//! record shape ([`StoredEvent`]), and the concurrency errors appends can
//! surface. The in-memory reference implementations live in [`memory`].

use std::future::Future;

pub use nonempty::NonEmpty;
use thiserror::Error;

pub mod memory;

/// Number of records a single read returns unless the caller asks otherwise.
pub const DEFAULT_LIMIT: usize = 50;

/// Immutable record stored under a stream name.
///
/// Records are keyed uniquely by `position` within their stream. The `kind`
/// tag drives type resolution on read; `data` is an opaque payload produced
/// by a [`Codec`](crate::codec::Codec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Position within the stream. Unique per stream.
    pub position: u64,
    /// Stored type tag.
    pub kind: String,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
}

/// Append rejected by optimistic position-collision detection.
///
/// Conflicts are fatal to the call but recoverable by the caller: re-fetch
/// the stream, rebuild the batch, and try again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcurrencyConflict {
    /// The batch itself uses one position more than once.
    #[error(
        "concurrency conflict: position {position} appears more than once in the batch for \
         stream `{stream}`"
    )]
    DuplicateInBatch {
        /// Stream the append targeted.
        stream: String,
        /// The repeated position.
        position: u64,
    },
    /// A position in the batch is already taken in the stream.
    #[error(
        "concurrency conflict: position {position} already exists in stream `{stream}` (hint: \
         another writer got there first; reload and retry)"
    )]
    AlreadyExists {
        /// Stream the append targeted.
        stream: String,
        /// The already-occupied position.
        position: u64,
    },
}

/// Error from append operations.
#[derive(Debug, Error)]
pub enum AppendError<E>
where
    E: std::error::Error,
{
    /// Optimistic concurrency rejected the batch; the stream is unchanged.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[source] E),
}

/// Convenience alias for append outcomes.
pub type AppendOutcome<E> = Result<(), AppendError<E>>;

/// Append-only positional log of event records, per named stream.
///
/// Implementations must serialize concurrent calls against the same
/// instance so that appends are atomic with respect to concurrent readers
/// and writers: a failed append leaves the stream completely unchanged, a
/// successful one makes the whole batch visible at once. No retry logic
/// belongs here; conflicts propagate to the caller.
pub trait EventStore: Send + Sync {
    /// Store-specific error type for non-conflict failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append a batch of records to a stream.
    ///
    /// Positions must be pairwise distinct within the batch and must not
    /// already exist in the stream; otherwise the append fails with a
    /// [`ConcurrencyConflict`] and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] on a position collision, or
    /// [`AppendError::Store`] if the backend fails.
    fn append<'a>(
        &'a self,
        stream: &'a str,
        events: NonEmpty<StoredEvent>,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a;

    /// Read up to `count` records with `position >= begin` (from the start
    /// of the stream when `begin` is `None`), ascending by position.
    ///
    /// An unknown stream yields an empty result, not an error.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn get<'a>(
        &'a self,
        stream: &'a str,
        begin: Option<u64>,
        count: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a;

    /// Read up to `count` records ordered descending by position, most
    /// recent first.
    ///
    /// An unknown stream yields an empty result, not an error.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn get_backwards<'a>(
        &'a self,
        stream: &'a str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a;
}
