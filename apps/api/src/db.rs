use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::portfolio::store::PgPortfolioStore;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Builds the snapshot store and makes sure its table exists.
pub async fn portfolio_store(pool: PgPool) -> Result<PgPortfolioStore> {
    let store = PgPortfolioStore::new(pool);
    store
        .initialize_schema()
        .await
        .context("Failed to initialize trade_state table")?;
    Ok(store)
}
