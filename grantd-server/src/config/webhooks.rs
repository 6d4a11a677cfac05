/// Webhook delivery configuration options
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Seconds between retry worker ticks (default: 30)
    pub poll_interval_secs: u64,

    /// Maximum deliveries processed per tick (default: 50)
    pub batch_size: u32,

    /// Delivery attempts before a row is marked failed (default: 5)
    pub max_attempts: u32,

    /// Per-request delivery timeout in seconds (default: 10)
    pub delivery_timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            batch_size: 50,
            max_attempts: 5,
            delivery_timeout_secs: 10,
        }
    }
}

impl WebhookConfig {
    /// Creates a new configuration from environment variables
    pub fn from_env(config: &Self) -> Self {
        let mut result = config.clone();

        if let Ok(interval) = std::env::var("GRANTD_WEBHOOKS_POLL_INTERVAL_SECS") {
            if let Ok(parsed) = interval.parse::<u64>() {
                result.poll_interval_secs = parsed;
            }
        }

        if let Ok(batch) = std::env::var("GRANTD_WEBHOOKS_BATCH_SIZE") {
            if let Ok(parsed) = batch.parse::<u32>() {
                result.batch_size = parsed;
            }
        }

        if let Ok(attempts) = std::env::var("GRANTD_WEBHOOKS_MAX_ATTEMPTS") {
            if let Ok(parsed) = attempts.parse::<u32>() {
                result.max_attempts = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("GRANTD_WEBHOOKS_DELIVERY_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                result.delivery_timeout_secs = parsed;
            }
        }

        result
    }
}
