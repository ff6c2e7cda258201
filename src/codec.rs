//! Text encoding for structured values
//!
//! Everything stored through the JSON cache wrapper, sessions and
//! notifications passes through a [`Codec`]. The default is [`JsonCodec`];
//! swap in another implementation to change the stored representation
//! without touching call sites.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::CacheError;

/// Converts structured values to and from the store's text representation
pub trait Codec: Send + Sync + 'static {
    /// Encode a value to text
    fn encode(&self, value: &Value) -> Result<String, CacheError>;

    /// Decode text produced by [`Codec::encode`]
    fn decode(&self, text: &str) -> Result<Value, CacheError>;
}

/// Plain JSON text, compatible with what other clients of the store read
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String, CacheError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, text: &str) -> Result<Value, CacheError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Serialize `data` and encode it. Fails before anything reaches the store.
pub(crate) fn encode<T: Serialize + ?Sized>(
    codec: &dyn Codec,
    data: &T,
) -> Result<String, CacheError> {
    let value = serde_json::to_value(data)?;
    codec.encode(&value)
}

/// Decode stored text and deserialize it into `T`
pub(crate) fn decode<T: DeserializeOwned>(codec: &dyn Codec, text: &str) -> Result<T, CacheError> {
    let value = codec.decode(text)?;
    Ok(serde_json::from_value(value)?)
}
