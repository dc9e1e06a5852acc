//! Domain event primitives.
//!
//! `DomainEvent` is the lightweight trait every concrete event struct
//! implements; `EventSet` is the contract of a per-aggregate event sum type;
//! [`Recorded`] pairs an event with its stream-local sequence id.

use thiserror::Error;

use crate::codec::Codec;

/// Marker trait for events that can be persisted by an event store.
///
/// Each event carries a unique [`Self::KIND`] identifier so the repository
/// can route stored payloads back to the correct type when rebuilding an
/// aggregate.
pub trait DomainEvent {
    /// Stored type tag. Use lowercase, kebab-case for consistency:
    /// `"count-incremented"`, `"order-shipped"`, etc.
    const KIND: &'static str;
}

/// Contract of an aggregate's event sum type.
///
/// An aggregate groups its concrete event variants into one enum and
/// implements this trait on it. Encoding picks the payload and tag for the
/// active variant; decoding routes a stored tag back to the matching variant
/// via an exhaustive match, so an unhandled tag is rejected rather than
/// silently skipped.
pub trait EventSet: Sized {
    /// Every kind this sum type can decode.
    const KINDS: &'static [&'static str];

    /// Stored type tag of the active variant.
    fn kind(&self) -> &'static str;

    /// Encode the active variant's payload.
    ///
    /// # Errors
    ///
    /// Returns the codec's error if serialization fails.
    fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, C::Error>;

    /// Decode a stored payload into the variant named by `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError::UnknownKind`] if the tag is not one of
    /// [`Self::KINDS`], or [`EventDecodeError::Codec`] if the payload does
    /// not deserialize into the expected shape.
    fn decode<C: Codec>(kind: &str, data: &[u8], codec: &C)
    -> Result<Self, EventDecodeError<C::Error>>;
}

/// Error returned when decoding a stored event fails.
#[derive(Debug, Error)]
pub enum EventDecodeError<CodecError> {
    /// The stored type tag was not recognized by this event set.
    #[error("unknown event kind `{kind}`, expected one of {expected:?}")]
    UnknownKind {
        /// The unrecognized tag.
        kind: String,
        /// The tags this event set can decode.
        expected: &'static [&'static str],
    },
    /// The payload failed to deserialize into the expected shape.
    #[error("failed to decode event payload: {0}")]
    Codec(#[source] CodecError),
}

/// A domain event together with its stream-local sequence id.
///
/// The id is assigned by the aggregate engine when the event is raised, or
/// carried over from the stored record's position when the event is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded<E> {
    /// Stream-local sequence id. Contiguous from 0 within a stream.
    pub id: u64,
    /// The immutable fact itself.
    pub event: E,
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::codec::JsonCodec;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Opened {
        owner: String,
    }

    impl DomainEvent for Opened {
        const KIND: &'static str = "opened";
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum AccountEvent {
        Opened(Opened),
    }

    impl EventSet for AccountEvent {
        const KINDS: &'static [&'static str] = &[Opened::KIND];

        fn kind(&self) -> &'static str {
            match self {
                Self::Opened(_) => Opened::KIND,
            }
        }

        fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, C::Error> {
            match self {
                Self::Opened(event) => codec.serialize(event),
            }
        }

        fn decode<C: Codec>(
            kind: &str,
            data: &[u8],
            codec: &C,
        ) -> Result<Self, EventDecodeError<C::Error>> {
            match kind {
                "opened" => Ok(Self::Opened(
                    codec.deserialize(data).map_err(EventDecodeError::Codec)?,
                )),
                other => Err(EventDecodeError::UnknownKind {
                    kind: other.to_string(),
                    expected: Self::KINDS,
                }),
            }
        }
    }

    #[test]
    fn encode_decode_round_trips_through_the_tag() {
        let codec = JsonCodec;
        let event = AccountEvent::Opened(Opened {
            owner: "ada".to_string(),
        });

        let data = event.encode(&codec).unwrap();
        let decoded = AccountEvent::decode(event.kind(), &data, &codec).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn unknown_kind_lists_expected_kinds() {
        let codec = JsonCodec;
        let result = AccountEvent::decode("closed", b"{}", &codec);

        match result {
            Err(EventDecodeError::UnknownKind { kind, expected }) => {
                assert_eq!(kind, "closed");
                assert_eq!(expected, &["opened"]);
            }
            other => panic!("expected unknown kind error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_payload_shape_is_a_codec_error() {
        let codec = JsonCodec;
        let result = AccountEvent::decode("opened", br#"{"unexpected":1}"#, &codec);
        assert!(matches!(result, Err(EventDecodeError::Codec(_))));
    }
}
