//! # kv-session-cache
//!
//! Session storage, JSON caching, fixed-window rate limiting and a
//! notification queue on top of a single key-value store connection.
//!
//! ## Features
//!
//! - **One explicit component**: [`SessionCache`] is constructed and passed
//!   around like any other dependency; there is no global connection
//! - **Pluggable storage backends**: Redis for production, an in-memory store
//!   for tests and development, or your own [`KeyValueStore`]
//! - **Pluggable encoding**: structured values go through a [`Codec`]
//!   (JSON by default)
//! - **Bounded reconnects**: connection attempts back off exponentially and
//!   give up after an attempt ceiling or a total time budget
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kv_session_cache::{keys, RedisStore, SessionCache, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kv_session_cache::CacheError> {
//!     let cache: SessionCache<RedisStore> = SessionCache::new();
//!     cache.initialize(&StoreConfig::from_env()).await?;
//!
//!     let sid = cache.create_session(&serde_json::json!({"user": "alice"}), None).await?;
//!     let status = cache.check_rate_limit(&keys::rate_limit_key("alice"), 100, 60).await?;
//!     if status.is_exceeded() {
//!         // reject with 429
//!     }
//!
//!     cache.close().await
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod store;

pub use cache::{RateLimitStatus, SessionCache};
pub use codec::{Codec, JsonCodec};
pub use config::{RetryPolicy, StoreConfig};
pub use error::CacheError;
pub use store::{Connect, KeyValueStore, MemoryStore};

#[cfg(feature = "redis-store")]
pub use store::RedisStore;
