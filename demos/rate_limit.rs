//! Rate limiting, sessions and notifications against the in-memory store
//!
//! Swap `MemoryStore` for `RedisStore` and call `initialize` with
//! `StoreConfig::from_env()` to run the same flow against Redis.

use kv_session_cache::{keys, MemoryStore, SessionCache};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), kv_session_cache::CacheError> {
    tracing_subscriber::fmt::init();

    let cache: SessionCache<MemoryStore> = SessionCache::new();
    cache.initialize_with(MemoryStore::new()).await?;

    let sid = cache
        .create_session(&json!({"user": "alice", "role": "auditor"}), None)
        .await?;
    println!("created session {}", sid);

    let key = keys::rate_limit_key("alice");
    for request in 1..=7 {
        let status = cache.check_rate_limit(&key, 5, 60).await?;
        if status.is_exceeded() {
            println!("request {}: rejected (429), {} over the limit", request, status.current - status.limit);
            cache
                .add_notification(&json!({"kind": "rate_limited", "session": sid, "request": request}))
                .await?;
        } else {
            println!("request {}: ok, {} remaining", request, status.remaining);
        }
        if let Some(reset) = status.reset {
            println!("window resets at {}", reset);
        }
    }

    let notifications: Vec<Value> = cache.get_notifications(None).await?;
    println!("{} notifications queued", notifications.len());

    let removed = cache.cleanup().await?;
    println!("cleanup removed {} keys", removed);

    cache.close().await
}
