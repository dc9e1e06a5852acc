//! Payload serialization boundary.
//!
//! The repository and the snapshot machinery talk to storage in opaque
//! payload bytes plus a type tag; [`Codec`] is the seam where those bytes are
//! produced and consumed. [`JsonCodec`] is the reference implementation.

use serde::{Serialize, de::DeserializeOwned};

/// Object ⇄ payload codec.
///
/// Implementations must round-trip any value whose serde representation they
/// support; a payload that does not match the requested shape must fail
/// rather than produce a partial value.
pub trait Codec {
    /// Codec-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Serialize a value to payload bytes.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the value cannot be serialized.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Self::Error>;

    /// Deserialize payload bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the payload is malformed or does not match
    /// the expected shape.
    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, Self::Error>;
}

/// JSON codec backed by `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    type Error = serde_json::Error;

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(value)
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, Self::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct Payload {
        amount: i32,
    }

    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec;
        let value = Payload { amount: 42 };

        let bytes = codec.serialize(&value).unwrap();
        let decoded: Payload = codec.deserialize(&bytes).unwrap();

        assert_eq!(decoded, value);
    }

    #[test]
    fn json_codec_rejects_invalid_json() {
        let codec = JsonCodec;
        let result: Result<Payload, _> = codec.deserialize(b"not valid json");
        assert!(result.is_err());
    }

    #[test]
    fn json_codec_rejects_wrong_shape() {
        let codec = JsonCodec;
        let result: Result<Payload, _> = codec.deserialize(br#"{"wrong_field":123}"#);
        assert!(result.is_err());
    }
}
