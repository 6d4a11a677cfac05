use thiserror::Error;

pub mod memory;
pub mod null;
pub mod redis;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Key for a revoked grant, readable by any verifier.
pub fn revoked_grant_key(grant_id: &str) -> String {
    format!("revoked:grant:{grant_id}")
}

/// Key for a revoked token (`jti`).
pub fn revoked_token_key(jti: &str) -> String {
    format!("revoked:tok:{jti}")
}

/// Cache trait defining the interface for all revocation cache backends.
///
/// Entries are short marker strings with a per-key TTL equal to the
/// remaining lifetime of the revoked grant or token, so the cache never
/// outlives the record it shadows. Implementations must be thread-safe
/// (Send + Sync) and cloneable to support sharing across handlers.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Store a value with a per-key TTL in seconds
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    /// Retrieve a value from the cache
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Delete a value from the cache
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Performs a deep health check on the cache backend.
    ///
    /// For Redis this pings the server; for the in-memory cache it checks
    /// the cache is initialized. Returns Ok(()) if healthy, or Err with a
    /// descriptive message if unhealthy.
    async fn health_check(&self) -> Result<(), String>;
}

/// Cache implementation that provides a uniform interface regardless of
/// backend.
///
/// The concrete implementation is chosen at runtime based on the
/// application configuration; verification falls back to the authoritative
/// store on any miss, so the `Null` variant is a correct (if slower)
/// deployment.
#[derive(Clone)]
pub enum Cache {
    /// In-memory cache implementation using Moka
    InMemory(memory::InMemoryCache),
    /// Redis-based cache implementation
    Redis(redis::RedisCache),
    /// No-op cache implementation that doesn't actually cache anything
    Null(null::NullCache),
}

#[async_trait::async_trait]
impl CacheBackend for Cache {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.set(key, value, ttl_secs).await,
            Self::Redis(cache) => cache.set(key, value, ttl_secs).await,
            Self::Null(cache) => cache.set(key, value, ttl_secs).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self {
            Self::InMemory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
            Self::Null(cache) => cache.get(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.delete(key).await,
            Self::Redis(cache) => cache.delete(key).await,
            Self::Null(cache) => cache.delete(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(cache) => cache.health_check().await,
            Self::Redis(cache) => cache.health_check().await,
            Self::Null(cache) => cache.health_check().await,
        }
    }
}

/// Factory function to create the appropriate cache implementation based on
/// configuration.
pub async fn create_cache(config: &crate::config::GrantdConfig) -> Result<Cache, CacheError> {
    match config.cache.store {
        crate::config::CacheStore::InMemory => {
            let cache = memory::InMemoryCache::new(config.cache.memory.capacity);
            Ok(Cache::InMemory(cache))
        }
        crate::config::CacheStore::Redis => {
            if config.cache.redis.url.is_empty() {
                return Err(CacheError::Config(
                    "Redis URL is required for Redis cache".to_string(),
                ));
            }
            let cache = redis::RedisCache::new(&config.cache.redis.url)
                .await
                .map_err(CacheError::Config)?;
            Ok(Cache::Redis(cache))
        }
        crate::config::CacheStore::None => {
            let cache = null::NullCache::new();
            Ok(Cache::Null(cache))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::memory::InMemoryCache;
    use std::time::Duration;

    #[test]
    fn revocation_keys() {
        assert_eq!(revoked_grant_key("grnt_1"), "revoked:grant:grnt_1");
        assert_eq!(revoked_token_key("tok_1"), "revoked:tok:tok_1");
    }

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = Cache::InMemory(InMemoryCache::new(1024));

        cache
            .set("revoked:grant:grnt_1", "1", 60)
            .await
            .expect("Failed to set value");
        let value = cache
            .get("revoked:grant:grnt_1")
            .await
            .expect("Failed to get value");
        assert_eq!(value.as_deref(), Some("1"));

        let value = cache.get("revoked:grant:other").await.expect("Failed to get value");
        assert_eq!(value, None);

        cache
            .delete("revoked:grant:grnt_1")
            .await
            .expect("Failed to delete value");
        let value = cache
            .get("revoked:grant:grnt_1")
            .await
            .expect("Failed to get value");
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_cache_per_key_ttl() {
        let cache = Cache::InMemory(InMemoryCache::new(1024));

        cache.set("short", "1", 1).await.expect("Failed to set value");
        cache.set("long", "1", 60).await.expect("Failed to set value");

        assert!(cache.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.get("long").await.unwrap().is_some());
    }
}
