use crate::{
    cache::{create_cache, Cache, CacheBackend},
    config::GrantdConfig,
    keys::KeyManager,
    store::Store,
};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GrantdConfig>,
    pub store: Store,
    pub cache: Arc<Cache>,
    pub keys: Arc<KeyManager>,
    pub webhook_client: Arc<Client>,
}

impl AppState {
    pub async fn new(config: GrantdConfig) -> Result<Self, std::io::Error> {
        let store = if config.database_path.is_empty() {
            Store::memory()
        } else {
            Store::open(Path::new(&config.database_path))
        }
        .map_err(|e| std::io::Error::other(format!("Failed to open store: {e}")))?;

        if !config.api_key.is_empty() {
            store
                .seed_developer(&config.api_key, Some("bootstrap"))
                .map_err(|e| std::io::Error::other(format!("Failed to seed developer: {e}")))?;
        }

        let cache = create_cache(&config)
            .await
            .map_err(|e| std::io::Error::other(format!("Failed to create cache: {e}")))?;

        let keys = KeyManager::from_config(&config.keys, &config.issuer)
            .map_err(|e| std::io::Error::other(format!("Failed to initialize keys: {e}")))?;

        let webhook_client =
            AppState::create_webhook_client(config.webhooks.delivery_timeout_secs);

        Ok(Self {
            config: Arc::new(config),
            store,
            cache: Arc::new(cache),
            keys: Arc::new(keys),
            webhook_client: Arc::new(webhook_client),
        })
    }

    pub(crate) fn create_webhook_client(timeout_secs: u64) -> Client {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Deliveries are bounded by this timeout; the retry worker handles
        // anything slower.
        Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(2))
            .default_headers(headers)
            .user_agent("grantd-webhooks/0.1")
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .expect("Failed to create webhook client")
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        let store_healthy = self.store.health_check().is_ok();
        let cache_healthy = self.cache.health_check().await.is_ok();
        store_healthy && cache_healthy
    }
}
