use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::errors::StoreError;

/// Identifier of the single snapshot row.
pub const STATE_ID: &str = "default";

#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn load(&self) -> Result<Option<Value>, StoreError>;
    async fn save(&self, state: &Value) -> Result<(), StoreError>;
}

/// PostgreSQL-backed snapshot store. One row, upserted in place.
pub struct PgPortfolioStore {
    pool: PgPool,
}

impl PgPortfolioStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_state (
                id TEXT PRIMARY KEY,
                state JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PortfolioStore for PgPortfolioStore {
    async fn load(&self) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT state FROM trade_state WHERE id = $1")
            .bind(STATE_ID)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<Value, _>("state")))
    }

    async fn save(&self, state: &Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trade_state (id, state, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE SET state = EXCLUDED.state, updated_at = NOW()
            "#,
        )
        .bind(STATE_ID)
        .bind(state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
