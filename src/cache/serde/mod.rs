//! Default serde-based codec for disk tier values
//!
//! Values travel to disk as bincode bytes produced through the serde
//! integration, so any `Serialize + DeserializeOwned` type works without a
//! hand-written codec.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::traits::{CacheOperationError, ObjectCodec};

/// Bincode codec using the standard configuration.
///
/// The byte output is opaque to the rest of the cache; files carry exactly
/// these bytes with no header or framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<V> ObjectCodec<V> for BincodeCodec
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self, value: &V) -> Result<Vec<u8>, CacheOperationError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| CacheOperationError::serialization_failed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<V, CacheOperationError> {
        let (value, _len) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CacheOperationError::deserialization_failed(e.to_string()))?;
        Ok(value)
    }
}
