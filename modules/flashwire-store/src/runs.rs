use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;

use flashwire_common::types::RunStatus;

/// Repository for the `processing_runs` sidecar table.
#[derive(Clone)]
pub struct RunStore {
    pool: PgPool,
}

/// Counter snapshot written when a run closes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunCounters {
    pub total_entries: i32,
    pub processed_entries: i32,
    pub failed_entries: i32,
    pub dedupe_skipped: i32,
    pub clusters_created: i32,
}

impl RunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a run directly in `running` state.
    pub async fn create(&self, run_id: &str, tier: &str, target_date: NaiveDate) -> Result<()> {
        sqlx::query(
            "INSERT INTO processing_runs (run_id, status, pipeline_tier, target_date, started_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(run_id)
        .bind(RunStatus::Running.as_str())
        .bind(tier)
        .bind(target_date.format("%Y-%m-%d").to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        run_id: &str,
        counters: RunCounters,
        metrics: Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE processing_runs
             SET status = $2, completed_at = $3, total_entries = $4,
                 processed_entries = $5, failed_entries = $6, dedupe_skipped = $7,
                 clusters_created = $8, metrics = CAST($9 AS jsonb)
             WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(RunStatus::Completed.as_str())
        .bind(Utc::now())
        .bind(counters.total_entries)
        .bind(counters.processed_entries)
        .bind(counters.failed_entries)
        .bind(counters.dedupe_skipped)
        .bind(counters.clusters_created)
        .bind(metrics.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, run_id: &str, error: &str) -> Result<()> {
        let mut message = error.to_string();
        message.truncate(2000);
        sqlx::query(
            "UPDATE processing_runs
             SET status = $2, completed_at = $3, error_message = $4
             WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(RunStatus::Failed.as_str())
        .bind(Utc::now())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip runs stuck in `running` for over two hours to `failed`. Called
    /// before each new run so a crashed predecessor cannot block reclaiming
    /// its unprocessed entries forever.
    pub async fn sweep_abandoned(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE processing_runs
             SET status = $1, completed_at = now(),
                 error_message = 'abandoned: exceeded 2h runtime'
             WHERE status = $2 AND started_at < now() - interval '2 hours'",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(RunStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            warn!(swept, "Marked abandoned runs as failed");
        }
        Ok(swept)
    }
}
