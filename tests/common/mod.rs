//! Shared counting-domain fixtures for the integration tests.

#![allow(dead_code)]

use evoker::{
    Aggregate, Codec, DomainEvent, EventDecodeError, EventSet, NoSnapshots, Root, SnapshotState,
    Snapshotting, WithSnapshots,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incremented;

impl DomainEvent for Incremented {
    const KIND: &'static str = "incremented";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decremented;

impl DomainEvent for Decremented {
    const KIND: &'static str = "decremented";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterEvent {
    Incremented(Incremented),
    Decremented(Decremented),
}

impl EventSet for CounterEvent {
    const KINDS: &'static [&'static str] = &[Incremented::KIND, Decremented::KIND];

    fn kind(&self) -> &'static str {
        match self {
            Self::Incremented(_) => Incremented::KIND,
            Self::Decremented(_) => Decremented::KIND,
        }
    }

    fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, C::Error> {
        match self {
            Self::Incremented(event) => codec.serialize(event),
            Self::Decremented(event) => codec.serialize(event),
        }
    }

    fn decode<C: Codec>(
        kind: &str,
        data: &[u8],
        codec: &C,
    ) -> Result<Self, EventDecodeError<C::Error>> {
        match kind {
            "incremented" => Ok(Self::Incremented(
                codec.deserialize(data).map_err(EventDecodeError::Codec)?,
            )),
            "decremented" => Ok(Self::Decremented(
                codec.deserialize(data).map_err(EventDecodeError::Codec)?,
            )),
            other => Err(EventDecodeError::UnknownKind {
                kind: other.to_string(),
                expected: Self::KINDS,
            }),
        }
    }
}

/// Replay-only counter; derived state lives directly in the fields.
#[derive(Debug, Default)]
pub struct Counter {
    pub value: i64,
}

impl Aggregate for Counter {
    type Event = CounterEvent;
    type Snapshots = NoSnapshots;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CounterEvent::Incremented(_) => self.value += 1,
            CounterEvent::Decremented(_) => self.value -= 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub value: i64,
}

impl SnapshotState for CounterState {
    const KIND: &'static str = "counter-state";
}

/// Snapshot-capable counter with an explicit state type.
#[derive(Debug, Default)]
pub struct StatefulCounter {
    pub state: CounterState,
}

impl Aggregate for StatefulCounter {
    type Event = CounterEvent;
    type Snapshots = WithSnapshots;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CounterEvent::Incremented(_) => self.state.value += 1,
            CounterEvent::Decremented(_) => self.state.value -= 1,
        }
    }
}

impl Snapshotting for StatefulCounter {
    type State = CounterState;

    fn capture(&self) -> Self::State {
        self.state.clone()
    }

    fn restore(&mut self, state: Self::State) {
        self.state = state;
    }
}

/// Domain operations for any counter flavour.
pub trait CounterOps {
    fn increment(&mut self);
    fn decrement(&mut self);
}

impl<A> CounterOps for Root<A>
where
    A: Aggregate<Event = CounterEvent>,
{
    fn increment(&mut self) {
        self.raise(CounterEvent::Incremented(Incremented));
    }

    fn decrement(&mut self) {
        self.raise(CounterEvent::Decremented(Decremented));
    }
}

/// Fresh collision-free stream name.
pub fn stream_name() -> String {
    uuid::Uuid::new_v4().to_string()
}
