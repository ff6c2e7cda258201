//! Cache error types

use std::fmt;

/// Errors that can occur during cache operations
#[derive(Debug)]
pub enum CacheError {
    /// No live connection, or connecting exhausted its retry budget
    ConnectionError(String),
    /// Error during serialization/deserialization
    SerializationError(String),
    /// The store rejected the command (wrong type, non-integer counter, ...)
    StoreError(String),
    /// Redis error (when redis-store feature is enabled)
    #[cfg(feature = "redis-store")]
    RedisError(redis::RedisError),
}

impl CacheError {
    pub(crate) fn not_initialized() -> Self {
        CacheError::ConnectionError("not initialized".to_string())
    }

    /// Whether this error means the connection is unusable
    pub fn is_connection_error(&self) -> bool {
        matches!(self, CacheError::ConnectionError(_))
    }

    /// Whether this error came from encoding or decoding a value
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, CacheError::SerializationError(_))
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            CacheError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            CacheError::StoreError(msg) => write!(f, "Store error: {}", msg),
            #[cfg(feature = "redis-store")]
            CacheError::RedisError(e) => write!(f, "Redis error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "redis-store")]
            CacheError::RedisError(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        // Transport failures surface as connection errors; the connection
        // manager has already spent its reconnect budget by this point.
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            CacheError::ConnectionError(err.to_string())
        } else {
            CacheError::RedisError(err)
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}
