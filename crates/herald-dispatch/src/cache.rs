//! Acknowledgment cache
//!
//! Best-effort side channel: the worker writes one entry per accepted
//! delivery, keyed by the provider's message id. Nothing in the dispatch
//! path reads it back.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::Instant;

use crate::error::CacheError;

/// Longest lifetime any entry is stored with; longer TTLs are clamped
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[async_trait]
pub trait MessageCache: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Live entries whose key starts with `prefix`
    async fn entries(&self, prefix: &str) -> Result<BTreeMap<String, String>, CacheError>;
}

// ============================================================================
// Redis
// ============================================================================

pub struct RedisMessageCache {
    conn: ConnectionManager,
}

impl RedisMessageCache {
    /// Connect and verify the server answers `PING`
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl MessageCache for RedisMessageCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SET EX rejects a zero expiry
        let seconds = ttl.min(MAX_ENTRY_TTL).as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn entries(&self, prefix: &str) -> Result<BTreeMap<String, String>, CacheError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", prefix))
            .query_async(&mut conn)
            .await?;

        let mut entries = BTreeMap::new();
        for key in keys {
            // A key can expire between KEYS and GET
            let value: Option<String> = conn.get(key.as_str()).await?;
            if let Some(value) = value {
                entries.insert(key, value);
            }
        }
        Ok(entries)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local cache with per-entry expiry
#[derive(Default)]
pub struct InMemoryMessageCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone())
    }

    /// Remaining time-to-live of a live entry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(_, expires_at)| *expires_at - now)
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|(_, exp)| *exp > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageCache for InMemoryMessageCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl.min(MAX_ENTRY_TTL);
        let mut entries = self.entries.lock();
        entries.retain(|_, (_, exp)| *exp > Instant::now());
        entries.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn entries(&self, prefix: &str) -> Result<BTreeMap<String, String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(key, (_, exp))| key.starts_with(prefix) && *exp > now)
            .map(|(key, (value, _))| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_list_by_prefix() {
        let cache = InMemoryMessageCache::new();
        cache.set("msg:ext-1", "a", Duration::from_secs(60)).await.unwrap();
        cache.set("msg:ext-2", "b", Duration::from_secs(60)).await.unwrap();
        cache.set("other:1", "c", Duration::from_secs(60)).await.unwrap();

        let entries = cache.entries("msg:").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get("msg:ext-1").map(String::as_str), Some("a"));
        assert_eq!(cache.get("other:1").as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_ttl_is_recorded() {
        let cache = InMemoryMessageCache::new();
        cache.set("msg:ext-1", "a", Duration::from_secs(3600)).await.unwrap();

        let remaining = cache.ttl("msg:ext-1").unwrap();
        assert!(remaining > Duration::from_secs(3590));
        assert!(remaining <= Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_clamped() {
        let cache = InMemoryMessageCache::new();
        cache
            .set("msg:forever", "a", Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        assert_eq!(cache.get("msg:forever").as_deref(), Some("a"));
        assert!(cache.ttl("msg:forever").unwrap() <= MAX_ENTRY_TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = InMemoryMessageCache::new();
        cache.set("msg:short", "a", Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(cache.get("msg:short").is_none());
        assert!(cache.entries("msg:").await.unwrap().is_empty());
        assert!(cache.is_empty());
    }
}
