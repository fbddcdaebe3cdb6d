// Revocation store client
// One multiplexed ConnectionManager serves every revocation command; the
// manager reconnects on its own, so no pooling sits in front of it. The
// index only ever runs single-key commands under a short timeout.

use rand::{thread_rng, Rng};
use redis::{aio::ConnectionManager, Client, RedisError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use super::mask_store_url;
use super::redis_config::RedisConfig;

/// Cap for the jittered backoff between connect attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Budget for the health-check PING
const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to the revocation store
#[derive(Clone)]
pub struct RevocationStoreClient {
    manager: ConnectionManager,
    command_timeout: Duration,
}

/// Health check status for the revocation store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisHealth {
    pub is_healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl RevocationStoreClient {
    /// Connect with bounded, jittered retries and prove the store answers
    /// a PING before startup proceeds.
    pub async fn connect(config: RedisConfig) -> Result<Self, RedisError> {
        config.validate().map_err(|e| {
            RedisError::from((
                redis::ErrorKind::InvalidClientConfig,
                "Invalid configuration",
                e,
            ))
        })?;

        info!(
            "Connecting to revocation store at {}",
            mask_store_url(&config.redis_url)
        );
        let client = Client::open(config.redis_url.as_str())?;

        let mut delay = config.retry_delay;
        let mut attempt = 0;
        let manager = loop {
            let connect = timeout(
                config.connection_timeout,
                ConnectionManager::new(client.clone()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(RedisError::from((
                    redis::ErrorKind::IoError,
                    "Revocation store connect timeout",
                )))
            });

            match connect {
                Ok(manager) => break manager,
                Err(e) if attempt < config.retry_attempts => {
                    attempt += 1;
                    warn!(
                        "Revocation store connect attempt {}/{} failed: {}",
                        attempt, config.retry_attempts, e
                    );
                    sleep(delay).await;
                    let jitter = Duration::from_millis(thread_rng().gen_range(0..100));
                    delay = std::cmp::min(delay * 2 + jitter, MAX_RETRY_DELAY);
                },
                Err(e) => return Err(e),
            }
        };

        let mut probe = manager.clone();
        redis::cmd("PING").query_async::<String>(&mut probe).await?;
        info!("Revocation store connected");

        Ok(Self {
            manager,
            command_timeout: config.command_timeout,
        })
    }

    /// A handle for one command sequence. The manager multiplexes and
    /// reconnects internally; cloning is cheap.
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// The per-command budget the revocation index must stay within
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// PING with latency, for the /health endpoint
    pub async fn health_check(&self) -> RedisHealth {
        let start = Instant::now();
        let mut conn = self.connection();

        let outcome = timeout(
            HEALTH_TIMEOUT,
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await;

        let latency_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(_)) => RedisHealth {
                is_healthy: true,
                latency_ms,
                error: None,
            },
            Ok(Err(e)) => RedisHealth {
                is_healthy: false,
                latency_ms,
                error: Some(e.to_string()),
            },
            Err(_) => RedisHealth {
                is_healthy: false,
                latency_ms,
                error: Some(format!(
                    "health ping timed out after {}ms",
                    HEALTH_TIMEOUT.as_millis()
                )),
            },
        }
    }
}
