//! Plan persistence
//!
//! One capability: save a finished daily trading plan. The `PlanSink` trait
//! keeps the tool layer independent of the backing store so tests can swap
//! in a scripted sink.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseSettings;

/// Sink for finished daily plans
#[async_trait]
pub trait PlanSink: Send + Sync {
    /// Persist a plan, returning the generated row identifier
    async fn save(&self, bias: &str, levels: &[f64], reasoning: &str) -> anyhow::Result<i64>;
}

/// Postgres-backed plan sink
pub struct PgPlanSink {
    pool: PgPool,
}

impl PgPlanSink {
    /// Connect a pool from configuration
    pub async fn connect(config: &DatabaseSettings) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!("Connected to plan database");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanSink for PgPlanSink {
    async fn save(&self, bias: &str, levels: &[f64], reasoning: &str) -> anyhow::Result<i64> {
        // Levels are stored as a JSON array in a text column
        let levels_json = serde_json::to_string(levels)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO daily_analysis (bias, support_resistance_levels, reasoning, created_at) \
             VALUES ($1, $2, $3, NOW()) RETURNING id",
        )
        .bind(bias)
        .bind(levels_json)
        .bind(reasoning)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

/// Sink used when no database is configured; every save fails with a clear
/// message that the tool layer reports back to the model
pub struct UnconfiguredSink;

#[async_trait]
impl PlanSink for UnconfiguredSink {
    async fn save(&self, _bias: &str, _levels: &[f64], _reasoning: &str) -> anyhow::Result<i64> {
        anyhow::bail!("No database configured; set database.url to enable plan persistence")
    }
}
