//! The session/cache/rate-limit component

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::codec::{self, Codec, JsonCodec};
use crate::config::StoreConfig;
use crate::error::CacheError;
use crate::keys;
use crate::store::{Connect, KeyValueStore};

/// Default TTL for [`SessionCache::cache_set`] (1 hour)
pub const DEFAULT_CACHE_TTL: u64 = 3600;

/// Default TTL for sessions (1 day)
pub const DEFAULT_SESSION_TTL: u64 = 86400;

/// Default number of notifications returned by [`SessionCache::get_notifications`]
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 10;

/// Result of a fixed-window rate-limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Requests counted in the current window, including this one
    pub current: u64,
    /// The limit the caller asked about
    pub limit: u64,
    /// `max(0, limit - current)`
    pub remaining: u64,
    /// When the window ends. Only set on the call that opened the window;
    /// use [`SessionCache::ttl`] on the key to learn it later.
    pub reset: Option<DateTime<Utc>>,
}

impl RateLimitStatus {
    /// Whether this request went over the limit
    pub fn is_exceeded(&self) -> bool {
        self.current > self.limit
    }
}

/// Session storage, JSON caching, rate limiting and notifications over one
/// shared store connection
///
/// The component starts disconnected. Call [`initialize`](Self::initialize)
/// (or [`initialize_with`](Self::initialize_with)) once at startup and
/// [`close`](Self::close) at shutdown; every data operation in between shares
/// the same handle. Operations issued while disconnected fail with
/// [`CacheError::ConnectionError`] and never reconnect on their own.
///
/// Each public method is one unit of atomicity. Sequences of calls are not
/// atomic as a whole and may interleave with other callers.
pub struct SessionCache<S: KeyValueStore> {
    store: RwLock<Option<Arc<S>>>,
    codec: Arc<dyn Codec>,
    cache_ttl: u64,
    session_ttl: u64,
}

impl<S: KeyValueStore> SessionCache<S> {
    /// Create a disconnected cache using the JSON codec
    pub fn new() -> Self {
        Self {
            store: RwLock::new(None),
            codec: Arc::new(JsonCodec),
            cache_ttl: DEFAULT_CACHE_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    /// Use a different encoding for cached values, sessions and notifications
    pub fn with_codec<C: Codec>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Set the default TTL for `cache_set` (default: 3600)
    pub fn with_cache_ttl(mut self, ttl: u64) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the default TTL for sessions (default: 86400)
    pub fn with_session_ttl(mut self, ttl: u64) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Attach an already-built store after probing it with a ping
    ///
    /// A no-op if a store is already attached.
    pub async fn initialize_with(&self, store: S) -> Result<(), CacheError> {
        if self.is_connected() {
            tracing::debug!("cache already initialized");
            return Ok(());
        }
        store.ping().await?;
        let mut slot = self.store.write();
        if slot.is_none() {
            *slot = Some(Arc::new(store));
            tracing::info!("cache connection ready");
        }
        Ok(())
    }

    /// Release the connection. Calls already in flight keep their handle and
    /// finish normally. Calling this while disconnected does nothing.
    pub async fn close(&self) -> Result<(), CacheError> {
        let store = self.store.write().take();
        match store {
            Some(store) => {
                store.close().await?;
                tracing::info!("cache connection closed");
            }
            None => tracing::debug!("close called on disconnected cache"),
        }
        Ok(())
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.store.read().is_some()
    }

    fn store(&self) -> Result<Arc<S>, CacheError> {
        self.store.read().clone().ok_or_else(CacheError::not_initialized)
    }

    // Scalars

    /// Set a string value, with an optional TTL applied in the same command
    pub async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        self.store()?.set(key, value, ttl_secs).await
    }

    /// Get a string value; absent or expired keys return None
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.store()?.get(key).await
    }

    /// Delete a key
    pub async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.store()?.del(&[key.to_string()]).await?;
        Ok(())
    }

    /// Check whether a key exists
    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.store()?.exists(key).await
    }

    /// Set the expiry of an existing key; false if the key doesn't exist
    pub async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        self.store()?.expire(key, ttl_secs).await
    }

    /// Remaining lifetime of a key in seconds
    pub async fn ttl(&self, key: &str) -> Result<Option<u64>, CacheError> {
        self.store()?.ttl(key).await
    }

    // Hashes

    /// Set one field of a hash; other fields are untouched
    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.store()?.hset(key, field, value).await
    }

    /// Get one field of a hash
    pub async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.store()?.hget(key, field).await
    }

    /// Get every field of a hash
    pub async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.store()?.hgetall(key).await
    }

    // Lists

    /// Push onto the head of a list
    pub async fn list_push_left(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.store()?.lpush(key, value).await
    }

    /// Pop from the tail of a list
    pub async fn list_pop_right(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.store()?.rpop(key).await
    }

    /// Inclusive range; negative indices count from the end (-1 = last)
    pub async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, CacheError> {
        self.store()?.lrange(key, start, stop).await
    }

    // Sets

    /// Add a member to a set
    pub async fn set_add(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.store()?.sadd(key, value).await
    }

    /// All members of a set
    pub async fn set_members(&self, key: &str) -> Result<HashSet<String>, CacheError> {
        self.store()?.smembers(key).await
    }

    // JSON cache

    /// Serialize `data` and store it with a TTL (default: 3600 seconds)
    ///
    /// Fails with [`CacheError::SerializationError`] before touching the
    /// store if `data` cannot be encoded.
    pub async fn cache_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        ttl_secs: impl Into<Option<u64>>,
    ) -> Result<(), CacheError> {
        let text = codec::encode(self.codec.as_ref(), data)?;
        let ttl = ttl_secs.into().unwrap_or(self.cache_ttl);
        self.store()?.set(key, &text, Some(ttl)).await
    }

    /// Read and decode a cached value; None if the key is missing
    ///
    /// Stored text that doesn't decode into `T` is an error, not a miss.
    pub async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store()?.get(key).await? {
            Some(text) => codec::decode(self.codec.as_ref(), &text).map(Some),
            None => Ok(None),
        }
    }

    // Sessions

    /// Store session data under `sid` (default TTL: 86400 seconds)
    pub async fn set_session<T: Serialize + ?Sized>(
        &self,
        sid: &str,
        user_data: &T,
        ttl_secs: impl Into<Option<u64>>,
    ) -> Result<(), CacheError> {
        let ttl = ttl_secs.into().unwrap_or(self.session_ttl);
        self.cache_set(&keys::session_key(sid), user_data, ttl).await
    }

    /// Load session data; None if missing or expired
    pub async fn get_session<T: DeserializeOwned>(&self, sid: &str) -> Result<Option<T>, CacheError> {
        self.cache_get(&keys::session_key(sid)).await
    }

    /// Delete a session
    pub async fn delete_session(&self, sid: &str) -> Result<(), CacheError> {
        self.del(&keys::session_key(sid)).await
    }

    /// Store session data under a freshly generated ID and return the ID
    pub async fn create_session<T: Serialize + ?Sized>(
        &self,
        user_data: &T,
        ttl_secs: impl Into<Option<u64>>,
    ) -> Result<String, CacheError> {
        let sid = Uuid::new_v4().to_string();
        self.set_session(&sid, user_data, ttl_secs).await?;
        Ok(sid)
    }

    /// Reset a session's TTL without rewriting its data
    ///
    /// Returns false if the session doesn't exist.
    pub async fn touch_session(
        &self,
        sid: &str,
        ttl_secs: impl Into<Option<u64>>,
    ) -> Result<bool, CacheError> {
        let ttl = ttl_secs.into().unwrap_or(self.session_ttl);
        self.expire(&keys::session_key(sid), ttl).await
    }

    // Rate limiting

    /// Count a request against a fixed window and report the totals
    ///
    /// The first request in a window (counter goes from absent to 1) sets the
    /// key's expiry to `window_secs`; later requests never move it. This call
    /// never rejects anything; deciding what to do when
    /// [`RateLimitStatus::is_exceeded`] is up to the caller.
    ///
    /// Fixed windows let up to twice `limit` requests through around a window
    /// boundary.
    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: u64,
        window_secs: u64,
    ) -> Result<RateLimitStatus, CacheError> {
        let store = self.store()?;
        // Rejected before counting so a bad window never leaves a counter
        // without an expiry behind.
        let window_end = window_end(window_secs)?;
        let current = store.incr(key).await?;
        let current = u64::try_from(current).map_err(|_| {
            CacheError::StoreError(format!("rate-limit counter {} holds negative value {}", key, current))
        })?;

        let reset = if current == 1 {
            // Separate command; a concurrent duplicate sets the same expiry.
            store.expire(key, window_secs).await?;
            Some(window_end)
        } else {
            None
        };

        let status = RateLimitStatus {
            current,
            limit,
            remaining: limit.saturating_sub(current),
            reset,
        };
        if status.is_exceeded() {
            tracing::debug!(key, current, limit, "rate limit exceeded");
        }
        Ok(status)
    }

    // Notifications

    /// Serialize a payload and push it onto the notification list
    pub async fn add_notification<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), CacheError> {
        let text = codec::encode(self.codec.as_ref(), payload)?;
        self.store()?.lpush(keys::NOTIFICATIONS_KEY, &text).await
    }

    /// The newest `limit` notifications, newest first (default: 10)
    ///
    /// Reading does not consume.
    pub async fn get_notifications<T: DeserializeOwned>(
        &self,
        limit: impl Into<Option<usize>>,
    ) -> Result<Vec<T>, CacheError> {
        let limit = limit.into().unwrap_or(DEFAULT_NOTIFICATION_LIMIT);
        let store = self.store()?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        store
            .lrange(keys::NOTIFICATIONS_KEY, 0, stop)
            .await?
            .iter()
            .map(|text| codec::decode(self.codec.as_ref(), text))
            .collect()
    }

    /// Delete every queued notification
    pub async fn clear_notifications(&self) -> Result<(), CacheError> {
        self.del(keys::NOTIFICATIONS_KEY).await
    }

    // Maintenance

    /// Delete every session and rate-limit key, live or not
    ///
    /// This is destructive: all users are logged out and all rate-limit
    /// windows restart. Run it in maintenance windows only. Returns the
    /// number of keys deleted.
    pub async fn cleanup(&self) -> Result<usize, CacheError> {
        let store = self.store()?;
        let mut deleted = 0;
        for pattern in keys::cleanup_patterns() {
            let matched = store.scan(&pattern).await?;
            deleted += store.del(&matched).await?;
        }
        tracing::info!(deleted, "cache cleanup removed session and rate-limit keys");
        Ok(deleted)
    }
}

/// Absolute end of a window opened now
fn window_end(window_secs: u64) -> Result<DateTime<Utc>, CacheError> {
    i64::try_from(window_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|window| Utc::now().checked_add_signed(window))
        .ok_or_else(|| CacheError::StoreError(format!("rate-limit window out of range: {}s", window_secs)))
}

impl<S: Connect> SessionCache<S> {
    /// Connect using `config` and probe the connection
    ///
    /// Connecting retries per `config.retry` and fails with
    /// [`CacheError::ConnectionError`] once that budget is spent. A no-op if
    /// already connected.
    pub async fn initialize(&self, config: &StoreConfig) -> Result<(), CacheError> {
        if self.is_connected() {
            tracing::debug!("cache already initialized");
            return Ok(());
        }
        let store = S::connect(config).await?;
        self.initialize_with(store).await
    }
}

impl<S: KeyValueStore> Default for SessionCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KeyValueStore> std::fmt::Debug for SessionCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("connected", &self.is_connected())
            .field("cache_ttl", &self.cache_ttl)
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}
