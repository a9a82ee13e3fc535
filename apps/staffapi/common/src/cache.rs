use crate::ServiceError;
use async_trait::async_trait;
use redis::Client as RedisClient;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

/// String-keyed blob store with per-entry TTL
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError>;

    /// Values come back in the same order as `keys`, `None` for absent entries.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ServiceError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ServiceError>;

    /// Writes every `(key, value)` pair with the same TTL in one batch.
    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, ServiceError> {
        let client = RedisClient::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis");

        Ok(Self { connection })
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let mut conn = self.connection.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await?;

        Ok(value)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ServiceError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.clone();
        let values = redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<String>>>(&mut conn)
            .await?;

        Ok(values)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ServiceError> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .exec_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), ServiceError> {
        if entries.is_empty() {
            return Ok(());
        }

        let seconds = ttl.as_secs().max(1);
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(seconds)
                .ignore();
        }

        let mut conn = self.connection.clone();
        pipe.exec_async(&mut conn).await?;

        Ok(())
    }
}

/// Expired entries are swept on write once the map grows past this size
const PURGE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process cache for local runs and tests
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));

        if before > entries.len() {
            debug!(
                "Purged {} expired cache entries, {} remaining",
                before - entries.len(),
                entries.len()
            );
        }
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let now = Instant::now();
        let entries = self.entries.read().await;

        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ServiceError> {
        let now = Instant::now();
        let entries = self.entries.read().await;

        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|entry| !entry.is_expired(now))
                    .map(|entry| entry.value.clone())
            })
            .collect())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ServiceError> {
        let should_purge = {
            let mut entries = self.entries.write().await;
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
            entries.len() >= PURGE_THRESHOLD
        };

        if should_purge {
            self.purge_expired().await;
        }

        Ok(())
    }

    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), ServiceError> {
        let expires_at = Instant::now() + ttl;
        let should_purge = {
            let mut entries_map = self.entries.write().await;
            for (key, value) in entries {
                entries_map.insert(
                    key.clone(),
                    CacheEntry {
                        value: value.clone(),
                        expires_at,
                    },
                );
            }
            entries_map.len() >= PURGE_THRESHOLD
        };

        if should_purge {
            self.purge_expired().await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("room:foo", "{}", Duration::from_secs(120))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(119)).await;
        assert_eq!(cache.get("room:foo").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("room:foo").await.unwrap(), None);

        cache.purge_expired().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_cache_mget_preserves_order() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("user:a", "A", ttl).await.unwrap();
        cache.set("user:c", "C", ttl).await.unwrap();

        let keys = vec![
            "user:c".to_string(),
            "user:b".to_string(),
            "user:a".to_string(),
        ];
        let values = cache.mget(&keys).await.unwrap();

        assert_eq!(
            values,
            vec![Some("C".to_string()), None, Some("A".to_string())]
        );
    }

    #[tokio::test]
    async fn test_memory_cache_overwrite() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("user:a", "old", ttl).await.unwrap();
        cache.set("user:a", "new", ttl).await.unwrap();

        assert_eq!(cache.get("user:a").await.unwrap().as_deref(), Some("new"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_set_many() {
        let cache = MemoryCache::new();
        cache.set("user:a", "old", Duration::from_secs(60)).await.unwrap();

        let entries = vec![
            ("user:a".to_string(), "A".to_string()),
            ("user:b".to_string(), "B".to_string()),
        ];
        cache.set_many(&entries, Duration::from_secs(30)).await.unwrap();
        cache.set_many(&[], Duration::from_secs(30)).await.unwrap();

        let keys = vec!["user:a".to_string(), "user:b".to_string()];
        assert_eq!(
            cache.mget(&keys).await.unwrap(),
            vec![Some("A".to_string()), Some("B".to_string())]
        );
        assert_eq!(cache.len().await, 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.mget(&keys).await.unwrap(), vec![None, None]);
    }
}
