//! Public traits and shared types for the cache system

pub mod types_and_enums;

pub use types_and_enums::CacheOperationError;

/// Object serializer collaborator.
///
/// Encodes a value to an opaque byte sequence for the disk tier and decodes
/// it back. Both directions may fail; failures are absorbed by the stores
/// (a failed encode leaves prior state untouched, a failed decode reads as
/// a miss).
pub trait ObjectCodec<V>: Send + Sync + 'static {
    /// Encode a value to bytes.
    fn encode(&self, value: &V) -> Result<Vec<u8>, CacheOperationError>;

    /// Decode a value from bytes. `bytes` may be corrupt or truncated.
    fn decode(&self, bytes: &[u8]) -> Result<V, CacheOperationError>;
}
