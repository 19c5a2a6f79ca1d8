use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use flashwire_common::error::FailureReason;
use flashwire_common::types::JobStatus;

/// Repository for the `feed_entry_jobs` sidecar table: the per-(run, entry)
/// state machine. UNIQUE(feed_entry_id, run_id) is the claim invariant.
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

/// Dedupe verdict fields persisted on a job row.
#[derive(Debug, Clone)]
pub struct DedupeRecord {
    pub content_hash: String,
    pub minhash: Option<String>,
    pub is_duplicate: bool,
    pub duplicate_of: Option<Uuid>,
}

/// A (entry, hash, signature) triple from an earlier run over the same
/// target date, used to seed the dedupe index on resume.
#[derive(Debug, Clone)]
pub struct SeededSignature {
    pub feed_entry_id: Uuid,
    pub content_hash: String,
    pub minhash: Option<String>,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent bulk claim: insert one queued job per entry, ignoring
    /// entries already claimed by this run. Returns how many were claimed.
    pub async fn claim_bulk(&self, entry_ids: &[Uuid], run_id: &str) -> Result<u64> {
        if entry_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "INSERT INTO feed_entry_jobs (feed_entry_id, run_id, status, attempts)
             SELECT unnest($1::uuid[]), $2, $3, 1
             ON CONFLICT DO NOTHING",
        )
        .bind(entry_ids)
        .bind(run_id)
        .bind(JobStatus::Queued.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_status(&self, entry_id: Uuid, run_id: &str, status: JobStatus) -> Result<()> {
        sqlx::query(
            "UPDATE feed_entry_jobs SET status = $3, updated_at = now()
             WHERE feed_entry_id = $1 AND run_id = $2",
        )
        .bind(entry_id)
        .bind(run_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status_bulk(
        &self,
        entry_ids: &[Uuid],
        run_id: &str,
        status: JobStatus,
    ) -> Result<()> {
        if entry_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE feed_entry_jobs SET status = $3, updated_at = now()
             WHERE feed_entry_id = ANY($1) AND run_id = $2",
        )
        .bind(entry_ids)
        .bind(run_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        entry_id: Uuid,
        run_id: &str,
        reason: FailureReason,
        error: &str,
    ) -> Result<()> {
        let mut message = error.to_string();
        message.truncate(2000);
        sqlx::query(
            "UPDATE feed_entry_jobs
             SET status = $3, failure_reason = $4, last_error = $5, updated_at = now()
             WHERE feed_entry_id = $1 AND run_id = $2",
        )
        .bind(entry_id)
        .bind(run_id)
        .bind(JobStatus::Failed.as_str())
        .bind(reason.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a successful extraction along with its stage timings.
    pub async fn record_extraction(
        &self,
        entry_id: Uuid,
        run_id: &str,
        method: &str,
        chars: i32,
        fetch_ms: i32,
        extract_ms: i32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE feed_entry_jobs
             SET status = $3, extraction_method = $4, extraction_chars = $5,
                 fetch_duration_ms = $6, extract_duration_ms = $7, updated_at = now()
             WHERE feed_entry_id = $1 AND run_id = $2",
        )
        .bind(entry_id)
        .bind(run_id)
        .bind(JobStatus::Extracted.as_str())
        .bind(method)
        .bind(chars)
        .bind(fetch_ms)
        .bind(extract_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a dedupe verdict. Duplicates short-circuit to
    /// `skipped_duplicate`; uniques advance to `deduped`.
    pub async fn record_dedupe(
        &self,
        entry_id: Uuid,
        run_id: &str,
        record: &DedupeRecord,
    ) -> Result<()> {
        let status = if record.is_duplicate {
            JobStatus::SkippedDuplicate
        } else {
            JobStatus::Deduped
        };
        sqlx::query(
            "UPDATE feed_entry_jobs
             SET status = $3, content_hash = $4, minhash = $5,
                 is_duplicate = $6, duplicate_of = $7, updated_at = now()
             WHERE feed_entry_id = $1 AND run_id = $2",
        )
        .bind(entry_id)
        .bind(run_id)
        .bind(status.as_str())
        .bind(&record.content_hash)
        .bind(&record.minhash)
        .bind(record.is_duplicate)
        .bind(record.duplicate_of)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Status -> count for one run.
    pub async fn status_counts(&self, run_id: &str) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query(
            "SELECT status, count(*) AS count FROM feed_entry_jobs
             WHERE run_id = $1 GROUP BY status",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    /// Hashes and signatures persisted by earlier runs over the same target
    /// date. Seeding these keeps duplicate detection stable across restarts.
    pub async fn prior_signatures(
        &self,
        target_date: NaiveDate,
        current_run_id: &str,
    ) -> Result<Vec<SeededSignature>> {
        let rows = sqlx::query(
            "SELECT j.feed_entry_id, j.content_hash, j.minhash
             FROM feed_entry_jobs j
             JOIN processing_runs r ON r.run_id = j.run_id
             WHERE r.target_date = $1
               AND j.run_id <> $2
               AND j.content_hash IS NOT NULL
               AND j.is_duplicate = false
             ORDER BY j.feed_entry_id",
        )
        .bind(target_date.format("%Y-%m-%d").to_string())
        .bind(current_run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SeededSignature {
                feed_entry_id: row.try_get("feed_entry_id")?,
                content_hash: row.try_get("content_hash")?,
                minhash: row.try_get("minhash")?,
            });
        }
        Ok(out)
    }
}
