pub(crate) use crate::config::cache::{CacheConfig, CacheStore};
pub(crate) use crate::config::keys::KeysConfig;
pub(crate) use crate::config::webhooks::WebhookConfig;

pub mod cache;
pub mod keys;
pub mod webhooks;

/// Main configuration structure for the grantd server.
///
/// Every field can be overridden through a `GRANTD_*` environment variable;
/// see the `from_env` constructors on each section.
#[derive(Debug, Clone)]
pub struct GrantdConfig {
    /// The port the server will listen to (default: 7701)
    pub port: u16,

    /// Seed API key for the bootstrap developer account. When set, a
    /// developer row keyed by the SHA-256 of this value is created at
    /// startup.
    pub api_key: String,

    /// Path of the SQLite database file. Empty means in-memory (useful for
    /// tests and local experiments; state is lost on restart).
    pub database_path: String,

    /// Issuer URL stamped into every grant token (`iss` claim) and used to
    /// build consent URLs.
    pub issuer: String,

    /// Upper bound on `delegationDepth` for delegated grants.
    pub max_delegation_depth: i64,

    /// Key manager configuration
    pub keys: KeysConfig,

    /// Revocation cache configuration
    pub cache: CacheConfig,

    /// Webhook delivery configuration
    pub webhooks: WebhookConfig,
}

impl Default for GrantdConfig {
    fn default() -> Self {
        Self {
            port: 7701,
            api_key: String::new(),
            database_path: String::new(),
            issuer: "https://grantd.dev".to_string(),
            max_delegation_depth: 32,
            keys: KeysConfig::default(),
            cache: CacheConfig::default(),
            webhooks: WebhookConfig::default(),
        }
    }
}

impl GrantdConfig {
    /// Creates a new configuration from environment variables
    pub fn new() -> Self {
        Self::from_env(&Self::default())
    }

    /// Creates a new configuration from environment variables
    pub fn from_env(config: &Self) -> Self {
        let mut result = config.clone();

        if let Ok(port) = std::env::var("GRANTD_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                result.port = parsed;
            }
        }

        if let Ok(api_key) = std::env::var("GRANTD_API_KEY") {
            result.api_key = api_key;
        }

        if let Ok(path) = std::env::var("GRANTD_DATABASE_PATH") {
            result.database_path = path;
        }

        if let Ok(issuer) = std::env::var("GRANTD_ISSUER") {
            result.issuer = issuer;
        }

        if let Ok(depth) = std::env::var("GRANTD_MAX_DELEGATION_DEPTH") {
            if let Ok(parsed) = depth.parse::<i64>() {
                result.max_delegation_depth = parsed;
            }
        }

        result.keys = KeysConfig::from_env(&result.keys);
        result.cache = CacheConfig::from_env(&result.cache);
        result.webhooks = WebhookConfig::from_env(&result.webhooks);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GrantdConfig::default();
        assert_eq!(config.port, 7701);
        assert_eq!(config.max_delegation_depth, 32);
        assert_eq!(config.cache.store, CacheStore::None);
        assert!(!config.keys.auto_generate);
    }
}
