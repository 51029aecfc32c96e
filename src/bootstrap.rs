use std::time::Duration;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::{config::Config, error::AppResult, ledger::LedgerRepository};

pub async fn initialize_repository(config: &Config) -> AppResult<LedgerRepository> {
    info!("Initializing backfill components ...");

    let pool = initialize_database(config.database_url()?, config.max_connections).await?;

    Ok(LedgerRepository::new(pool))
}

async fn initialize_database(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    // The job is sequential; a handful of connections is plenty.
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: {} max connections", max_connections.max(1));

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
