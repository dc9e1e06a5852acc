//! In-memory event store implementations.
//!
//! Three reference backends with identical observable semantics, exercised
//! by one shared contract suite in the integration tests:
//!
//! - [`Store`] - stream name to an ordered position map; the primary
//!   reference implementation.
//! - [`TableStore`] - rows kept in arrival order and sorted at read time,
//!   the shape of an unordered table queried with an order-by.
//! - [`JsonStore`] - payloads parsed into JSON documents on append and
//!   re-serialized on read, the shape of a JSON document column.
//!
//! Every store guards its state with a single `RwLock` scoped to the
//! instance, held only for the duration of each operation, so appends are
//! atomic with respect to concurrent readers and writers. Stores are
//! `Clone`; clones share the same underlying streams.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    convert::Infallible,
    future::Future,
    sync::{Arc, RwLock},
};

use nonempty::NonEmpty;

use crate::store::{AppendOutcome, ConcurrencyConflict, EventStore, StoredEvent};

/// Reject batches that collide with themselves or with occupied positions.
fn detect_conflicts(
    stream: &str,
    events: &NonEmpty<StoredEvent>,
    occupied: impl Fn(u64) -> bool,
) -> Result<(), ConcurrencyConflict> {
    let mut seen = BTreeSet::new();
    for event in events.iter() {
        if !seen.insert(event.position) {
            return Err(ConcurrencyConflict::DuplicateInBatch {
                stream: stream.to_string(),
                position: event.position,
            });
        }
        if occupied(event.position) {
            return Err(ConcurrencyConflict::AlreadyExists {
                stream: stream.to_string(),
                position: event.position,
            });
        }
    }
    Ok(())
}

type OrderedStreams = HashMap<String, BTreeMap<u64, StoredEvent>>;

/// Event store backed by a map of stream name to an ordered position map.
#[derive(Clone, Debug)]
pub struct Store {
    streams: Arc<RwLock<OrderedStreams>>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for Store {
    type Error = Infallible;

    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    fn append<'a>(
        &'a self,
        stream: &'a str,
        events: NonEmpty<StoredEvent>,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a {
        let result = (|| {
            let mut streams = self.streams.write().expect("event store lock poisoned");
            if let Some(entries) = streams.get(stream) {
                detect_conflicts(stream, &events, |position| entries.contains_key(&position))?;
            } else {
                detect_conflicts(stream, &events, |_| false)?;
            }

            let entries = streams.entry(stream.to_string()).or_default();
            let appended = events.len();
            for event in events {
                entries.insert(event.position, event);
            }
            tracing::debug!(appended, "events appended to stream");
            Ok(())
        })();
        std::future::ready(result)
    }

    #[tracing::instrument(skip(self))]
    fn get<'a>(
        &'a self,
        stream: &'a str,
        begin: Option<u64>,
        count: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let streams = self.streams.read().expect("event store lock poisoned");
        let events = streams.get(stream).map_or_else(Vec::new, |entries| {
            entries
                .range(begin.unwrap_or(0)..)
                .take(count)
                .map(|(_, event)| event.clone())
                .collect()
        });
        tracing::trace!(returned = events.len(), "stream read");
        std::future::ready(Ok(events))
    }

    #[tracing::instrument(skip(self))]
    fn get_backwards<'a>(
        &'a self,
        stream: &'a str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let streams = self.streams.read().expect("event store lock poisoned");
        let events = streams.get(stream).map_or_else(Vec::new, |entries| {
            entries.values().rev().take(count).cloned().collect()
        });
        std::future::ready(Ok(events))
    }
}

type RowStreams = HashMap<String, Vec<StoredEvent>>;

/// Event store keeping rows in arrival order, sorted on every read.
///
/// Mirrors a table without a clustered position index: appends push rows,
/// queries filter and order by position.
#[derive(Clone, Debug)]
pub struct TableStore {
    streams: Arc<RwLock<RowStreams>>,
}

impl TableStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for TableStore {
    type Error = Infallible;

    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    fn append<'a>(
        &'a self,
        stream: &'a str,
        events: NonEmpty<StoredEvent>,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a {
        let result = (|| {
            let mut streams = self.streams.write().expect("event store lock poisoned");
            if let Some(rows) = streams.get(stream) {
                detect_conflicts(stream, &events, |position| {
                    rows.iter().any(|row| row.position == position)
                })?;
            } else {
                detect_conflicts(stream, &events, |_| false)?;
            }

            let rows = streams.entry(stream.to_string()).or_default();
            let appended = events.len();
            rows.extend(events);
            tracing::debug!(appended, "events appended to stream");
            Ok(())
        })();
        std::future::ready(result)
    }

    #[tracing::instrument(skip(self))]
    fn get<'a>(
        &'a self,
        stream: &'a str,
        begin: Option<u64>,
        count: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let streams = self.streams.read().expect("event store lock poisoned");
        let events = streams.get(stream).map_or_else(Vec::new, |rows| {
            let mut selected: Vec<StoredEvent> = rows
                .iter()
                .filter(|row| row.position >= begin.unwrap_or(0))
                .cloned()
                .collect();
            selected.sort_by_key(|row| row.position);
            selected.truncate(count);
            selected
        });
        std::future::ready(Ok(events))
    }

    #[tracing::instrument(skip(self))]
    fn get_backwards<'a>(
        &'a self,
        stream: &'a str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let streams = self.streams.read().expect("event store lock poisoned");
        let events = streams.get(stream).map_or_else(Vec::new, |rows| {
            let mut selected: Vec<StoredEvent> = rows.to_vec();
            selected.sort_by_key(|row| std::cmp::Reverse(row.position));
            selected.truncate(count);
            selected
        });
        std::future::ready(Ok(events))
    }
}

/// Error type for [`JsonStore`].
#[derive(Debug, thiserror::Error)]
pub enum JsonStoreError {
    /// An appended payload was not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),
    /// A stored document could not be re-serialized.
    #[error("failed to serialize stored document: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Clone, Debug)]
struct JsonRow {
    kind: String,
    doc: serde_json::Value,
}

type DocumentStreams = HashMap<String, BTreeMap<u64, JsonRow>>;

/// Event store keeping payloads as parsed JSON documents.
///
/// Appends parse every payload before anything is written, so a non-JSON
/// payload fails the whole batch with [`JsonStoreError::Parse`] and the
/// stream stays unchanged. Reads serialize the documents back to bytes.
#[derive(Clone, Debug)]
pub struct JsonStore {
    streams: Arc<RwLock<DocumentStreams>>,
}

impl JsonStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for JsonStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_stored(position: u64, row: &JsonRow) -> Result<StoredEvent, JsonStoreError> {
    Ok(StoredEvent {
        position,
        kind: row.kind.clone(),
        data: serde_json::to_vec(&row.doc).map_err(JsonStoreError::Serialize)?,
    })
}

impl EventStore for JsonStore {
    type Error = JsonStoreError;

    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    fn append<'a>(
        &'a self,
        stream: &'a str,
        events: NonEmpty<StoredEvent>,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a {
        let result = (|| {
            // Parse every payload first so a bad one rejects the whole batch.
            let mut parsed = Vec::with_capacity(events.len());
            for event in events.iter() {
                let doc = serde_json::from_slice(&event.data)
                    .map_err(|e| crate::store::AppendError::Store(JsonStoreError::Parse(e)))?;
                parsed.push((
                    event.position,
                    JsonRow {
                        kind: event.kind.clone(),
                        doc,
                    },
                ));
            }

            let mut streams = self.streams.write().expect("event store lock poisoned");
            if let Some(entries) = streams.get(stream) {
                detect_conflicts(stream, &events, |position| entries.contains_key(&position))?;
            } else {
                detect_conflicts(stream, &events, |_| false)?;
            }

            let entries = streams.entry(stream.to_string()).or_default();
            let appended = parsed.len();
            for (position, row) in parsed {
                entries.insert(position, row);
            }
            tracing::debug!(appended, "events appended to stream");
            Ok(())
        })();
        std::future::ready(result)
    }

    #[tracing::instrument(skip(self))]
    fn get<'a>(
        &'a self,
        stream: &'a str,
        begin: Option<u64>,
        count: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let streams = self.streams.read().expect("event store lock poisoned");
        let events = streams.get(stream).map_or_else(
            || Ok(Vec::new()),
            |entries| {
                entries
                    .range(begin.unwrap_or(0)..)
                    .take(count)
                    .map(|(position, row)| to_stored(*position, row))
                    .collect()
            },
        );
        std::future::ready(events)
    }

    #[tracing::instrument(skip(self))]
    fn get_backwards<'a>(
        &'a self,
        stream: &'a str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let streams = self.streams.read().expect("event store lock poisoned");
        let events = streams.get(stream).map_or_else(
            || Ok(Vec::new()),
            |entries| {
                entries
                    .iter()
                    .rev()
                    .take(count)
                    .map(|(position, row)| to_stored(*position, row))
                    .collect()
            },
        );
        std::future::ready(events)
    }
}
