// Diesel migration runner for PostgreSQL
// Uses embedded migrations; diesel_migrations requires a sync connection,
// so the harness runs on the blocking pool.

use diesel::Connection;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use std::error::Error;
use tracing::{debug, info};

use crate::db::MIGRATIONS;

/// Run all pending migrations; returns how many were applied
pub async fn run_migrations(database_url: &str) -> Result<usize, Box<dyn Error + Send + Sync>> {
    let database_url = database_url.to_string();

    let applied =
        tokio::task::spawn_blocking(move || -> Result<usize, Box<dyn Error + Send + Sync>> {
            debug!("Establishing sync connection for migrations...");
            let mut conn = PgConnection::establish(&database_url)
                .map_err(|e| format!("Failed to establish sync connection: {}", e))?;

            let pending = conn
                .pending_migrations(MIGRATIONS)
                .map_err(|e| format!("Failed to check pending migrations: {}", e))?;

            if pending.is_empty() {
                debug!("No pending migrations to run");
                return Ok(0);
            }

            let mut applied_count = 0;
            for migration in pending {
                info!("Applying migration: {}", migration.name());
                conn.run_migration(&migration)
                    .map_err(|e| format!("Failed to run migration {}: {}", migration.name(), e))?;
                applied_count += 1;
            }

            info!("Successfully applied {} migrations", applied_count);
            Ok(applied_count)
        })
        .await
        .map_err(|e| format!("Migration task panicked: {}", e))??;

    Ok(applied)
}
