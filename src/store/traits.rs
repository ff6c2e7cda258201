//! Key-value store trait

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::config::StoreConfig;
use crate::error::CacheError;

/// Trait for key-value storage backends
///
/// Every method maps onto a single store command and is atomic on its own.
/// All values are UTF-8 strings; structured data is encoded above this layer.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Get a string value. Absent and expired keys return None.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a string value
    ///
    /// With a TTL the value and its expiry are written in one command; a TTL
    /// of zero deletes the key. Without a TTL any previous expiry is cleared.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<usize, CacheError>;

    /// Check whether a key exists
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Set expiry on an existing key. Returns false if the key doesn't exist.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError>;

    /// Remaining lifetime in seconds. None when absent or without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, CacheError>;

    /// Increment an integer value by one, creating it at 0 first if absent
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Set one field of a hash
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError>;

    /// Get one field of a hash
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    /// Get every field of a hash
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    /// Push onto the head of a list
    async fn lpush(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Pop from the tail of a list
    async fn rpop(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Inclusive range; negative indices count from the end (-1 = last)
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, CacheError>;

    /// Add a member to a set
    async fn sadd(&self, key: &str, member: &str) -> Result<(), CacheError>;

    /// All members of a set
    async fn smembers(&self, key: &str) -> Result<HashSet<String>, CacheError>;

    /// All keys matching a glob pattern (`*`, `?`)
    ///
    /// Can be slow on large datasets; meant for maintenance.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Round-trip liveness probe
    async fn ping(&self) -> Result<(), CacheError>;

    /// Hook run when the owning cache is closed (optional)
    ///
    /// This is not the only release point. The cache drops its handle on
    /// close, and calls already in flight keep their own clone, so the
    /// backend's resources must also be freed on `Drop` of the last handle.
    /// The Redis backend has nothing to do here: its socket closes when the
    /// last connection manager clone is dropped.
    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Backends that can build themselves from a [`StoreConfig`]
#[async_trait]
pub trait Connect: KeyValueStore + Sized {
    /// Establish a connection, retrying per `config.retry`
    async fn connect(config: &StoreConfig) -> Result<Self, CacheError>;
}
