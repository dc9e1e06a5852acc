#![doc = include_str!("../README.md")]

pub mod aggregate;
pub mod codec;
pub mod event;
pub mod repository;
pub mod snapshot;
pub mod store;

pub use aggregate::{Aggregate, LoadError, Root};
pub use codec::{Codec, JsonCodec};
pub use event::{DomainEvent, EventDecodeError, EventSet, Recorded};
pub use nonempty::NonEmpty;
pub use repository::{GetError, Repository, SaveError, snapshot_stream};
pub use snapshot::{
    NoSnapshots, Snapshot, SnapshotError, SnapshotPolicy, SnapshotState, Snapshotting,
    WithSnapshots,
};
pub use store::{AppendError, ConcurrencyConflict, EventStore, StoredEvent};
