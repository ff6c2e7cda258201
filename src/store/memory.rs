//! In-memory key-value store
//!
//! This is primarily for development and testing.
//! For production, use RedisStore or another persistent store.
//!
//! Expiry is tracked with [`tokio::time::Instant`], so tests running on a
//! paused runtime can move past TTLs with `tokio::time::advance`.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{Connect, KeyValueStore};
use crate::config::StoreConfig;
use crate::error::CacheError;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

struct StoredValue {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

/// Expiry instant `ttl_secs` from now, if the clock can represent it
fn deadline(ttl_secs: u64) -> Result<Instant, CacheError> {
    Instant::now()
        .checked_add(Duration::from_secs(ttl_secs))
        .ok_or_else(|| CacheError::StoreError(format!("invalid expire time: {}", ttl_secs)))
}

fn wrong_type() -> CacheError {
    CacheError::StoreError(WRONG_TYPE.to_string())
}

/// In-memory key-value store
///
/// Warning: This store is not suitable for production use because:
/// - Data is lost on restart
/// - Data is not shared across processes
/// - Expired keys are only reclaimed on write or by `cleanup_expired`
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drop every expired key
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, stored| !stored.is_expired(now));
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|stored| !stored.is_expired(now))
            .count()
    }

    /// Whether the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against the live entry at `key`, if any
    fn read_live<T>(&self, key: &str, f: impl FnOnce(&StoredValue) -> T) -> Option<T> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|stored| !stored.is_expired(Instant::now()))
            .map(f)
    }

    /// Run `f` with write access after purging `key` if it has expired
    fn write_live<T>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, StoredValue>) -> T) -> T {
        let mut entries = self.entries.write();
        if entries
            .get(key)
            .is_some_and(|stored| stored.is_expired(Instant::now()))
        {
            entries.remove(key);
        }
        f(&mut *entries)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

/// Redis-style glob matching supporting `*` and `?`
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// Resolve an inclusive, possibly negative, range against a list length
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.read_live(key, |stored| match &stored.value {
            Value::Str(s) => Ok(s.clone()),
            _ => Err(wrong_type()),
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        let expires_at = match ttl_secs {
            Some(0) => {
                self.entries.write().remove(key);
                return Ok(());
            }
            Some(secs) => Some(deadline(secs)?),
            None => None,
        };
        let stored = StoredValue {
            value: Value::Str(value.to_string()),
            expires_at,
        };
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), stored);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|stored| !stored.is_expired(now))
            .count();
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.read_live(key, |_| ()).is_some())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        let expires_at = match ttl_secs {
            0 => None,
            secs => Some(deadline(secs)?),
        };
        Ok(self.write_live(key, |entries| match expires_at {
            None => entries.remove(key).is_some(),
            Some(exp) => match entries.get_mut(key) {
                Some(stored) => {
                    stored.expires_at = Some(exp);
                    true
                }
                None => false,
            },
        }))
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let now = Instant::now();
        Ok(self
            .read_live(key, |stored| stored.expires_at)
            .flatten()
            .map(|exp| {
                let remaining = exp.saturating_duration_since(now);
                remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
            }))
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.write_live(key, |entries| {
            let stored = entries
                .entry(key.to_string())
                .or_insert_with(|| StoredValue::new(Value::Str("0".to_string())));
            let Value::Str(current) = &mut stored.value else {
                return Err(wrong_type());
            };
            let next = match current.parse::<i64>().ok().and_then(|n| n.checked_add(1)) {
                Some(next) => next,
                None => {
                    return Err(CacheError::StoreError(
                        "value is not an integer or out of range".to_string(),
                    ))
                }
            };
            *current = next.to_string();
            Ok(next)
        })
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.write_live(key, |entries| {
            let stored = entries
                .entry(key.to_string())
                .or_insert_with(|| StoredValue::new(Value::Hash(HashMap::new())));
            match &mut stored.value {
                Value::Hash(hash) => {
                    hash.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                _ => Err(wrong_type()),
            }
        })
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .read_live(key, |stored| match &stored.value {
                Value::Hash(hash) => Ok(hash.get(field).cloned()),
                _ => Err(wrong_type()),
            })
            .transpose()?
            .flatten())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        Ok(self
            .read_live(key, |stored| match &stored.value {
                Value::Hash(hash) => Ok(hash.clone()),
                _ => Err(wrong_type()),
            })
            .transpose()?
            .unwrap_or_default())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.write_live(key, |entries| {
            let stored = entries
                .entry(key.to_string())
                .or_insert_with(|| StoredValue::new(Value::List(VecDeque::new())));
            match &mut stored.value {
                Value::List(list) => {
                    list.push_front(value.to_string());
                    Ok(())
                }
                _ => Err(wrong_type()),
            }
        })
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.write_live(key, |entries| {
            let Some(stored) = entries.get_mut(key) else {
                return Ok(None);
            };
            let Value::List(list) = &mut stored.value else {
                return Err(wrong_type());
            };
            let popped = list.pop_back();
            // Lists vanish once empty
            if list.is_empty() {
                entries.remove(key);
            }
            Ok(popped)
        })
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, CacheError> {
        Ok(self
            .read_live(key, |stored| match &stored.value {
                Value::List(list) => Ok(resolve_range(list.len(), start, stop)
                    .map(|(from, to)| list.range(from..=to).cloned().collect::<Vec<_>>())
                    .unwrap_or_default()),
                _ => Err(wrong_type()),
            })
            .transpose()?
            .unwrap_or_default())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), CacheError> {
        self.write_live(key, |entries| {
            let stored = entries
                .entry(key.to_string())
                .or_insert_with(|| StoredValue::new(Value::Set(HashSet::new())));
            match &mut stored.value {
                Value::Set(set) => {
                    set.insert(member.to_string());
                    Ok(())
                }
                _ => Err(wrong_type()),
            }
        })
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, CacheError> {
        Ok(self
            .read_live(key, |stored| match &stored.value {
                Value::Set(set) => Ok(set.clone()),
                _ => Err(wrong_type()),
            })
            .transpose()?
            .unwrap_or_default())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|(key, stored)| !stored.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[async_trait]
impl Connect for MemoryStore {
    async fn connect(_config: &StoreConfig) -> Result<Self, CacheError> {
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("session:*", "session:abc"));
        assert!(glob_match("session:*", "session:"));
        assert!(!glob_match("session:*", "rate_limit:abc"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*:*:end", "x:y:z:end"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 1, 100), Some((1, 4)));
        assert_eq!(resolve_range(5, -100, 1), Some((0, 1)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(5, 5, 10), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();

        store.set("greeting", "hello", None).await.unwrap();
        assert_eq!(store.get("greeting").await.unwrap(), Some("hello".to_string()));
        assert!(store.exists("greeting").await.unwrap());

        let removed = store.del(&["greeting".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get("greeting").await.unwrap(), None);
        assert!(!store.exists("greeting").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store.set("temp", "v", Some(2)).await.unwrap();
        assert_eq!(store.ttl("temp").await.unwrap(), Some(2));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("temp").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("temp").await.unwrap(), None);
        assert_eq!(store.ttl("temp").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_reclaims_entries() {
        let store = MemoryStore::new();
        store.set("short", "v", Some(1)).await.unwrap();
        store.set("long", "v", Some(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        store.cleanup_expired();
        assert_eq!(store.entries.read().len(), 1);
        assert!(store.exists("long").await.unwrap());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_rejected() {
        let store = MemoryStore::new();
        let err = store.set("k", "v", Some(u64::MAX)).await.unwrap_err();
        assert!(matches!(err, CacheError::StoreError(_)));
        assert!(!store.exists("k").await.unwrap());

        store.set("k", "v", Some(60)).await.unwrap();
        let err = store.expire("k", u64::MAX).await.unwrap_err();
        assert!(matches!(err, CacheError::StoreError(_)));
        assert_eq!(store.ttl("k").await.unwrap(), Some(60));
    }

    #[tokio::test]
    async fn test_set_zero_ttl_deletes() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        store.set("k", "v", Some(0)).await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_without_ttl_clears_expiry() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(60)).await.unwrap();
        store.set("k", "w", None).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_keeps_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert!(store.expire("counter", 10).await.unwrap());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        assert_eq!(store.ttl("counter").await.unwrap(), Some(6));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.ttl("counter").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("k", "abc", None).await.unwrap();
        assert!(matches!(store.incr("k").await, Err(CacheError::StoreError(_))));
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.lpush("list", "a").await.unwrap();
        assert!(matches!(store.get("list").await, Err(CacheError::StoreError(_))));
        assert!(matches!(store.hset("list", "f", "v").await, Err(CacheError::StoreError(_))));
    }

    #[tokio::test]
    async fn test_hash_fields_are_independent() {
        let store = MemoryStore::new();
        store.hset("user:1", "name", "alice").await.unwrap();
        store.hset("user:1", "email", "a@example.com").await.unwrap();
        store.hset("user:1", "name", "alicia").await.unwrap();

        assert_eq!(store.hget("user:1", "name").await.unwrap(), Some("alicia".to_string()));
        assert_eq!(store.hget("user:1", "phone").await.unwrap(), None);
        let all = store.hgetall("user:1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["email"], "a@example.com");
        assert!(store.hgetall("user:2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_fifo() {
        let store = MemoryStore::new();
        for item in ["a", "b", "c"] {
            store.lpush("queue", item).await.unwrap();
        }
        assert_eq!(store.lrange("queue", 0, -1).await.unwrap(), vec!["c", "b", "a"]);
        assert_eq!(store.lrange("queue", -2, -1).await.unwrap(), vec!["b", "a"]);

        assert_eq!(store.rpop("queue").await.unwrap(), Some("a".to_string()));
        assert_eq!(store.rpop("queue").await.unwrap(), Some("b".to_string()));
        assert_eq!(store.rpop("queue").await.unwrap(), Some("c".to_string()));
        assert_eq!(store.rpop("queue").await.unwrap(), None);
        assert!(!store.exists("queue").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_members_collapse_duplicates() {
        let store = MemoryStore::new();
        store.sadd("tags", "rust").await.unwrap();
        store.sadd("tags", "redis").await.unwrap();
        store.sadd("tags", "rust").await.unwrap();

        let members = store.smembers("tags").await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.contains("rust"));
        assert!(members.contains("redis"));
    }

    #[tokio::test]
    async fn test_scan_matches_pattern() {
        let store = MemoryStore::new();
        store.set("session:1", "x", None).await.unwrap();
        store.set("session:2", "x", None).await.unwrap();
        store.set("other", "x", None).await.unwrap();

        let mut keys = store.scan("session:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session:1", "session:2"]);
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(other.get("k").await.unwrap(), Some("v".to_string()));
    }
}
