//! Error types shared across the cache system

/// Cache operation error types
///
/// Only construction surfaces these to callers; every other fault is
/// absorbed inside the stores and degrades to a no-op or a miss.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOperationError {
    SerializationError(String),
    DeserializationError(String),
    Io(String),
    StorageError(String),
    InvalidConfiguration(String),
}

impl std::fmt::Display for CacheOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheOperationError::SerializationError(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            CacheOperationError::DeserializationError(msg) => {
                write!(f, "Deserialization error: {}", msg)
            }
            CacheOperationError::Io(msg) => write!(f, "I/O error: {}", msg),
            CacheOperationError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            CacheOperationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for CacheOperationError {}

impl CacheOperationError {
    /// Create serialization error
    #[inline(always)]
    pub fn serialization_failed(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create deserialization error
    #[inline(always)]
    pub fn deserialization_failed(msg: impl Into<String>) -> Self {
        Self::DeserializationError(msg.into())
    }

    /// Create IO error
    #[inline(always)]
    pub fn io_failed(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create configuration error
    #[inline(always)]
    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

impl From<std::io::Error> for CacheOperationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
