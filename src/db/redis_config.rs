use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Revocation store (Redis) connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub redis_url: String,
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl RedisConfig {
    /// Create configuration from the loaded application config
    pub fn from_app_config(config: &crate::app_config::RevocationStoreConfig) -> Self {
        Self {
            redis_url: config.store_url.clone(),
            connection_timeout: Duration::from_secs(config.connection_timeout),
            command_timeout: Duration::from_millis(config.timeout_ms),
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.redis_url.is_empty() {
            return Err("Revocation store URL cannot be empty".to_string());
        }
        if self.connection_timeout.as_secs() == 0 {
            return Err("Connection timeout must be greater than 0".to_string());
        }
        if self.command_timeout.as_millis() == 0 {
            return Err("Command timeout must be greater than 0".to_string());
        }
        if self.retry_attempts == 0 {
            return Err("Retry attempts must be greater than 0".to_string());
        }
        Ok(())
    }
}
