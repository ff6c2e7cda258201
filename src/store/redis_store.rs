//! Redis key-value store
//!
//! Each trait method issues exactly one Redis command over a shared
//! [`ConnectionManager`], which reconnects transparently using the backoff
//! settings derived from [`RetryPolicy`].

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{Connect, KeyValueStore};
use crate::config::{RetryPolicy, StoreConfig};
use crate::error::CacheError;

const SCAN_BATCH: usize = 100;

/// Redis key-value store
///
/// # Example
///
/// ```rust,ignore
/// use kv_session_cache::{RedisStore, StoreConfig};
///
/// let store = RedisStore::connect(&StoreConfig::from_env()).await?;
/// ```
pub struct RedisStore {
    conn: Arc<ConnectionManager>,
}

impl RedisStore {
    /// Create a new Redis store from a connection string
    pub async fn from_url(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::ConnectionError(format!("Failed to create Redis client: {}", e)))?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection_manager(conn))
    }

    /// Create a new Redis store from an existing connection manager
    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }

    fn conn(&self) -> ConnectionManager {
        (*self.conn).clone()
    }

    /// Log and pass through transport failures so a dropped link is visible
    fn observe(err: redis::RedisError) -> CacheError {
        if err.is_connection_dropped() || err.is_io_error() {
            tracing::warn!(error = %err, "redis connection lost");
        }
        err.into()
    }
}

fn manager_config(retry: &RetryPolicy) -> ConnectionManagerConfig {
    ConnectionManagerConfig::new()
        .set_exponent_base(2)
        .set_factor(retry.base_delay.as_millis() as u64)
        .set_max_delay(retry.max_delay.as_millis() as u64)
        .set_number_of_retries(retry.max_attempts as usize)
        .set_connection_timeout(retry.max_delay)
        .set_response_timeout(retry.max_delay)
}

/// Redis keeps expiries as signed milliseconds; reject TTLs it cannot hold
/// instead of letting them wrap negative, which would delete the key.
fn expire_secs(ttl_secs: u64) -> Result<i64, CacheError> {
    i64::try_from(ttl_secs)
        .ok()
        .filter(|secs| secs.checked_mul(1000).is_some())
        .ok_or_else(|| CacheError::StoreError(format!("invalid expire time: {}", ttl_secs)))
}

impl Clone for RedisStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[async_trait]
impl Connect for RedisStore {
    async fn connect(config: &StoreConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url())
            .map_err(|e| CacheError::ConnectionError(format!("Failed to create Redis client: {}", e)))?;
        let retry = &config.retry;
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            // Each attempt only gets what is left of the total budget
            let remaining = retry.max_elapsed.saturating_sub(started.elapsed());
            let result = match tokio::time::timeout(remaining, Self::open(&client, retry)).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::ConnectionError(
                    "connection attempt timed out".to_string(),
                )),
            };

            match result {
                Ok(store) => {
                    tracing::info!(
                        host = %config.host,
                        port = config.port,
                        db = config.db,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "redis connection ready"
                    );
                    return Ok(store);
                }
                Err(err) if retry.should_retry(attempt, started.elapsed()) => {
                    let delay = retry.delay_for(attempt);
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "redis connect failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(attempt, error = %err, "redis connect retry budget exhausted");
                    return Err(CacheError::ConnectionError(format!(
                        "could not connect to {}:{} after {} attempts: {}",
                        config.host, config.port, attempt, err
                    )));
                }
            }
        }
    }
}

impl RedisStore {
    /// One connection attempt: a single-shot connection answers PING before
    /// the reconnecting manager is built, so the manager's own retries never
    /// run during the initial connect.
    async fn open(client: &redis::Client, retry: &RetryPolicy) -> Result<Self, CacheError> {
        let mut probe = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut probe).await?;
        let conn = ConnectionManager::new_with_config(client.clone(), manager_config(retry)).await?;
        Ok(Self::from_connection_manager(conn))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.conn().get(key).await.map_err(Self::observe)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        let mut conn = self.conn();
        match ttl_secs {
            // Set with expiration (EX = seconds)
            Some(ttl) if ttl > 0 => {
                expire_secs(ttl)?;
                conn.set_ex::<_, _, ()>(key, value, ttl).await
            }
            Some(_) => conn.del::<_, ()>(key).await,
            None => conn.set::<_, _, ()>(key, value).await,
        }
        .map_err(Self::observe)
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.conn().del(keys).await.map_err(Self::observe)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.conn().exists(key).await.map_err(Self::observe)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        let secs = expire_secs(ttl_secs)?;
        self.conn().expire(key, secs).await.map_err(Self::observe)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, CacheError> {
        // -2 = no such key, -1 = no expiry
        let secs: i64 = self.conn().ttl(key).await.map_err(Self::observe)?;
        Ok(u64::try_from(secs).ok())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.conn().incr(key, 1).await.map_err(Self::observe)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.conn()
            .hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(Self::observe)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.conn().hget(key, field).await.map_err(Self::observe)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.conn().hgetall(key).await.map_err(Self::observe)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.conn()
            .lpush::<_, _, ()>(key, value)
            .await
            .map_err(Self::observe)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.conn().rpop(key, None).await.map_err(Self::observe)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, CacheError> {
        self.conn()
            .lrange(key, start, stop)
            .await
            .map_err(Self::observe)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), CacheError> {
        self.conn()
            .sadd::<_, _, ()>(key, member)
            .await
            .map_err(Self::observe)
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, CacheError> {
        self.conn().smembers(key).await.map_err(Self::observe)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(Self::observe)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::observe)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        tracing::info!("redis connection closing");
        Ok(())
    }
}
