use super::{CacheBackend, CacheError};
use async_trait::async_trait;

/// NullCache is a cache implementation that does nothing.
///
/// Every lookup misses, which forces verifiers onto the authoritative
/// store. Used when no cache backend is configured.
#[derive(Clone, Debug, Default)]
pub struct NullCache;

impl NullCache {
    /// Create a new NullCache instance
    pub fn new() -> Self {
        NullCache
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_cache_operations() {
        let cache = NullCache::new();

        assert!(cache.set("revoked:grant:grnt_1", "1", 60).await.is_ok());
        assert!(cache.get("revoked:grant:grnt_1").await.unwrap().is_none());
        assert!(cache.delete("revoked:grant:grnt_1").await.is_ok());
        assert!(cache.health_check().await.is_ok());
    }
}
