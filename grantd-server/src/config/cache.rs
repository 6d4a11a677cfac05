/// Specifies which revocation cache backend to use
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CacheStore {
    InMemory,
    Redis,
    #[default]
    None,
}

/// Configuration for the revocation cache subsystem.
///
/// TTLs are per-entry (remaining lifetime of the revoked grant/token), so
/// there is no global TTL knob here, only backend selection and sizing.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache store type: "in-memory", "redis", or "none" (default)
    pub store: CacheStore,

    /// In-memory cache specific configuration
    pub memory: InMemoryConfig,

    /// Redis cache specific configuration
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store: CacheStore::None,
            memory: InMemoryConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration from environment variables
    pub fn from_env(config: &Self) -> Self {
        let mut result = config.clone();

        result.store = match std::env::var("GRANTD_CACHE_STORE").as_deref() {
            Ok("in-memory") => CacheStore::InMemory,
            Ok("redis") => CacheStore::Redis,
            Ok("none") => CacheStore::None,
            _ => result.store.clone(),
        };

        result.memory = InMemoryConfig::from_env(&result.memory);
        result.redis = RedisConfig::from_env(&result.redis);

        result
    }
}

/// In-memory cache configuration options
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum number of revocation entries kept resident (default: 100k)
    pub capacity: u64,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self { capacity: 100_000 }
    }
}

impl InMemoryConfig {
    /// Creates a new configuration from environment variables
    pub fn from_env(config: &Self) -> Self {
        let mut result = config.clone();

        if let Ok(capacity) = std::env::var("GRANTD_CACHE_MEMORY_CAPACITY") {
            if let Ok(parsed) = capacity.parse::<u64>() {
                result.capacity = parsed;
            }
        }

        result
    }
}

/// Redis cache configuration options
#[derive(Debug, Clone, Default)]
pub struct RedisConfig {
    /// Redis connection string
    pub url: String,
}

impl RedisConfig {
    /// Creates a new configuration from environment variables
    pub fn from_env(config: &Self) -> Self {
        let mut result = config.clone();

        if let Ok(url) = std::env::var("GRANTD_CACHE_REDIS_URL") {
            result.url = url;
        }

        result
    }
}
