// Identity store connectivity
// diesel-async + bb8 pool with embedded migrations; startup proves a real
// round trip before the Authority begins serving.

use bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use std::time::Duration;

// Embed migrations at compile time
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/diesel");

pub type DieselPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Identity store pool configuration
#[derive(Debug, Clone)]
pub struct DieselDatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl DieselDatabaseConfig {
    /// Build from the loaded application config
    pub fn from_app_config(config: &crate::app_config::DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connection_timeout: Duration::from_secs(config.connect_timeout),
            idle_timeout: Duration::from_secs(config.idle_timeout),
            max_lifetime: Duration::from_secs(config.max_lifetime),
        }
    }

    /// Build the identity-store pool and prove connectivity with one real
    /// query before startup continues.
    pub async fn connect(self) -> Result<DieselPool, Box<dyn std::error::Error>> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(self.url.clone());

        let pool = Pool::builder()
            .max_size(self.max_connections)
            .min_idle(Some(self.min_connections))
            .connection_timeout(self.connection_timeout)
            .idle_timeout(Some(self.idle_timeout))
            .max_lifetime(Some(self.max_lifetime))
            .build(manager)
            .await?;

        check_diesel_health(&pool).await?;

        tracing::info!(
            "Identity store pool ready ({} max connections)",
            self.max_connections
        );

        Ok(pool)
    }
}

/// One round trip through the pool. Used at startup and by /health; a
/// checked-out connection alone does not prove the server still answers.
pub async fn check_diesel_health(pool: &DieselPool) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = pool.get().await?;
    diesel::sql_query("SELECT 1").execute(&mut *conn).await?;
    Ok(())
}
