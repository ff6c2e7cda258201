//! Behaviour of SessionCache against the in-memory store

use kv_session_cache::{keys, CacheError, MemoryStore, SessionCache};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    roles: Vec<String>,
    manager: Option<Box<User>>,
}

fn alice() -> User {
    User {
        id: 1,
        name: "alice".to_string(),
        roles: vec!["admin".to_string(), "auditor".to_string()],
        manager: Some(Box::new(User {
            id: 7,
            name: "carol".to_string(),
            roles: vec![],
            manager: None,
        })),
    }
}

async fn connected() -> SessionCache<MemoryStore> {
    let cache = SessionCache::new();
    cache.initialize_with(MemoryStore::new()).await.unwrap();
    cache
}

#[tokio::test(start_paused = true)]
async fn test_set_then_get_until_ttl() {
    let cache = connected().await;
    cache.set("greeting", "hello", Some(5)).await.unwrap();
    assert_eq!(cache.get("greeting").await.unwrap(), Some("hello".to_string()));

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(cache.get("greeting").await.unwrap(), None);
    assert!(!cache.exists("greeting").await.unwrap());
}

#[tokio::test]
async fn test_cache_round_trip() {
    let cache = connected().await;
    cache.cache_set("user:1", &alice(), None).await.unwrap();
    assert_eq!(cache.cache_get::<User>("user:1").await.unwrap(), Some(alice()));

    let doc = json!({"n": 1.5, "list": [null, true, "x"], "nested": {"k": []}});
    cache.cache_set("doc", &doc, 60).await.unwrap();
    assert_eq!(cache.cache_get::<Value>("doc").await.unwrap(), Some(doc));

    assert_eq!(cache.cache_get::<User>("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_rate_limit_counts_down_in_window() {
    let cache = connected().await;
    let key = keys::rate_limit_key("client-1");

    let mut remaining = Vec::new();
    for call in 0..5 {
        let status = cache.check_rate_limit(&key, 5, 60).await.unwrap();
        assert_eq!(status.limit, 5);
        assert_eq!(status.reset.is_some(), call == 0);
        remaining.push(status.remaining);
    }
    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

    let sixth = cache.check_rate_limit(&key, 5, 60).await.unwrap();
    assert_eq!(sixth.current, 6);
    assert_eq!(sixth.remaining, 0);
    assert_eq!(sixth.reset, None);
    assert!(sixth.is_exceeded());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_window_resets() {
    let cache = connected().await;
    let key = keys::rate_limit_key("client-2");

    let first = cache.check_rate_limit(&key, 2, 10).await.unwrap();
    assert!(first.reset.is_some());
    cache.check_rate_limit(&key, 2, 10).await.unwrap();
    cache.check_rate_limit(&key, 2, 10).await.unwrap();

    // The window is fixed at the first request, not extended by later ones
    tokio::time::advance(Duration::from_secs(10)).await;

    let next = cache.check_rate_limit(&key, 2, 10).await.unwrap();
    assert_eq!(next.current, 1);
    assert_eq!(next.remaining, 1);
    assert!(next.reset.is_some());
}

#[tokio::test]
async fn test_notifications_newest_first() {
    let cache = connected().await;
    for payload in ["a", "b", "c"] {
        cache.add_notification(&json!({ "msg": payload })).await.unwrap();
    }

    let latest: Vec<Value> = cache.get_notifications(2).await.unwrap();
    assert_eq!(latest, vec![json!({"msg": "c"}), json!({"msg": "b"})]);

    // Reading does not consume
    let again: Vec<Value> = cache.get_notifications(10).await.unwrap();
    assert_eq!(again.len(), 3);

    cache.clear_notifications().await.unwrap();
    let empty: Vec<Value> = cache.get_notifications(10).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_lifecycle() {
    let cache = connected().await;
    cache.set_session("sid-1", &alice(), None).await.unwrap();
    assert_eq!(cache.get_session::<User>("sid-1").await.unwrap(), Some(alice()));

    cache.delete_session("sid-1").await.unwrap();
    assert_eq!(cache.get_session::<User>("sid-1").await.unwrap(), None);

    cache.set_session("sid-2", &alice(), 30).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(cache.get_session::<User>("sid-2").await.unwrap(), None);
}

#[tokio::test]
async fn test_structures() {
    let cache = connected().await;

    cache.hash_set("h", "a", "1").await.unwrap();
    cache.hash_set("h", "b", "2").await.unwrap();
    assert_eq!(cache.hash_get("h", "a").await.unwrap(), Some("1".to_string()));
    assert_eq!(cache.hash_get_all("h").await.unwrap().len(), 2);

    cache.list_push_left("jobs", "first").await.unwrap();
    cache.list_push_left("jobs", "second").await.unwrap();
    assert_eq!(cache.list_range("jobs", 0, -1).await.unwrap(), vec!["second", "first"]);
    assert_eq!(cache.list_pop_right("jobs").await.unwrap(), Some("first".to_string()));

    cache.set_add("tags", "x").await.unwrap();
    cache.set_add("tags", "x").await.unwrap();
    assert_eq!(cache.set_members("tags").await.unwrap().len(), 1);

    cache.del("tags").await.unwrap();
    assert!(cache.set_members("tags").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_data_operations_require_initialize() {
    let cache: SessionCache<MemoryStore> = SessionCache::new();

    let results: Vec<Result<(), CacheError>> = vec![
        cache.set("k", "v", None).await,
        cache.del("k").await,
        cache.hash_set("h", "f", "v").await,
        cache.list_push_left("l", "v").await,
        cache.set_add("s", "v").await,
        cache.cache_set("k", &json!(1), None).await,
        cache.set_session("sid", &json!(1), None).await,
        cache.delete_session("sid").await,
        cache.add_notification(&json!(1)).await,
        cache.clear_notifications().await,
    ];
    for result in results {
        assert!(matches!(result, Err(CacheError::ConnectionError(_))));
    }
    assert!(matches!(
        cache.get_session::<Value>("sid").await,
        Err(CacheError::ConnectionError(_))
    ));
}

#[tokio::test]
async fn test_concurrent_rate_limit_callers() {
    let cache = std::sync::Arc::new(connected().await);
    let key = keys::rate_limit_key("burst");

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.check_rate_limit(&key, 10, 60).await.unwrap() })
        })
        .collect();

    let mut counts = Vec::new();
    let mut resets = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status.reset.is_some() {
            resets += 1;
        }
        counts.push(status.current);
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=20).collect::<Vec<u64>>());
    assert_eq!(resets, 1);
}
