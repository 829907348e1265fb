//! SQLite-backed analytical service.
//!
//! Amounts are stored as TEXT so raw token units keep their full precision.
//! The complete summary is kept as JSON next to the columns used for aggregation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

use super::{SnipingAnalyticalService, SnipingPerformance};
use crate::task::TaskSummary;

#[derive(FromRow)]
struct PerformanceRow {
    total_investment: String,
    total_return: String,
    failed: bool,
}

#[derive(FromRow)]
struct SummaryRow {
    summary_json: String,
}

pub struct SqliteSnipingAnalyticalService {
    pool: Pool<Sqlite>,
}

impl SqliteSnipingAnalyticalService {
    /// Opens (or creates) the database file at `path`.
    pub async fn new(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .with_context(|| format!("Failed to connect to SQLite database {path}"))?;
        Self::create_schema(&pool).await?;
        info!("Sniping summaries are recorded to {}", path);
        Ok(Self { pool })
    }

    /// Private in-memory database, used by tests and dry runs without a file.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;
        Self::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sniping_task_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pool_id TEXT NOT NULL,
                base_mint TEXT NOT NULL,
                quote_mint TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                total_investment TEXT NOT NULL,
                total_return TEXT NOT NULL,
                failed BOOLEAN NOT NULL,
                error TEXT,
                summary_json TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create sniping_task_summaries table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sniping_task_summaries_pool ON sniping_task_summaries (pool_id);",
        )
        .execute(pool)
        .await
        .context("Failed to create pool_id index")?;
        Ok(())
    }
}

#[async_trait]
impl SnipingAnalyticalService for SqliteSnipingAnalyticalService {
    async fn record_sniping_task_summary(&self, summary: &TaskSummary) -> Result<()> {
        let summary_json = serde_json::to_string(summary).context("Failed to serialize task summary")?;
        let id = sqlx::query(
            r#"
            INSERT INTO sniping_task_summaries (
                pool_id, base_mint, quote_mint, started_at, finished_at,
                total_investment, total_return, failed, error, summary_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(summary.pool_id.to_string())
        .bind(summary.base_token.mint.to_string())
        .bind(summary.quote_token.mint.to_string())
        .bind(summary.started_at.timestamp_millis())
        .bind(summary.finished_at.timestamp_millis())
        .bind(summary.total_investment.to_string())
        .bind(summary.total_return.to_string())
        .bind(summary.error.is_some())
        .bind(summary.error.as_ref().map(|e| e.to_string()))
        .bind(summary_json)
        .execute(&self.pool)
        .await
        .context("Failed to insert task summary")?
        .last_insert_rowid();

        debug!("Recorded summary of pool {} with id {}", summary.pool_id, id);
        Ok(())
    }

    async fn sniping_task_summaries(&self) -> Result<Vec<TaskSummary>> {
        let rows: Vec<SummaryRow> =
            sqlx::query_as("SELECT summary_json FROM sniping_task_summaries ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch task summaries")?;
        rows.into_iter()
            .map(|row| serde_json::from_str(&row.summary_json).context("Corrupt task summary JSON"))
            .collect()
    }

    async fn sniping_performance(&self) -> Result<SnipingPerformance> {
        let rows: Vec<PerformanceRow> = sqlx::query_as(
            "SELECT total_investment, total_return, failed FROM sniping_task_summaries",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch task amounts")?;

        let mut performance = SnipingPerformance::default();
        for row in rows {
            let investment = Decimal::from_str(&row.total_investment)
                .with_context(|| format!("Invalid stored investment {}", row.total_investment))?;
            let returned = Decimal::from_str(&row.total_return)
                .with_context(|| format!("Invalid stored return {}", row.total_return))?;
            performance.add(investment, returned, row.failed);
        }
        Ok(performance)
    }
}
