use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema for the `tributes` table and its change trigger.
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn connect(database_url: &str) -> Result<Pool<Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
        .context("failed to connect to the tribute database")?;
    Ok(pool)
}

pub async fn migrate(pool: &Pool<Postgres>) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to apply tribute migrations")?;
    tracing::info!("tribute migrations applied");
    Ok(())
}

pub async fn check_ready(pool: &Pool<Postgres>) -> Result<()> {
    sqlx::query("SELECT 1 FROM tributes LIMIT 1")
        .execute(pool)
        .await
        .context("tributes table is not reachable")?;
    Ok(())
}
