use crate::Result;
use serde::{Serialize, de::DeserializeOwned};

/// A total function pair `T -> bytes` and `bytes -> T`, per the design notes:
/// managers are parameterized by a codec rather than assuming any particular
/// wire format for stored values.
pub trait Codec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Default codec for any `serde`-serializable value.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Fallback codec for callers that already deal in raw byte strings — a
/// total identity function, matching the "mapping of strings to anys" escape
/// hatch in the design notes.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Mapping-of-strings-to-anys fallback for untyped values, backed by the
/// same JSON encoding `JsonCodec` uses.
pub type AnyMap = std::collections::HashMap<String, serde_json::Value>;
