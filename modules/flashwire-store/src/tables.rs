//! Date-partitioned table resolution.
//!
//! The database holds daily tables named `feed_entries_YYYYMMDD`,
//! `flash_point_YYYYMMDD`, and `news_clusters_YYYYMMDD`. Table names cannot
//! be bound as parameters, so every name that gets formatted into SQL must
//! pass the `[A-Za-z0-9_]+` whitelist first.

use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));

static DATE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d{8})$").expect("valid regex"));

/// Resolved physical table names for one run. The single source of truth for
/// which tables a run reads and writes.
#[derive(Debug, Clone)]
pub struct TableSet {
    pub feed_entries: String,
    pub flash_point: String,
    pub news_clusters: String,
    pub target_date: NaiveDate,
}

impl TableSet {
    pub fn for_date(target_date: NaiveDate) -> Self {
        Self {
            feed_entries: partition_name("feed_entries", target_date),
            flash_point: partition_name("flash_point", target_date),
            news_clusters: partition_name("news_clusters", target_date),
            target_date,
        }
    }

    /// Resolve for an explicit date, defaulting to UTC today. When today's
    /// partitions have not landed yet, fall back to the most recent one.
    pub async fn resolve(pool: &PgPool, target_date: Option<NaiveDate>) -> Result<Self> {
        if let Some(date) = target_date {
            let set = Self::for_date(date);
            set.assert_inputs_exist(pool).await?;
            set.log_resolved();
            return Ok(set);
        }

        let today = chrono::Utc::now().date_naive();
        let set = Self::for_date(today);
        if set.assert_inputs_exist(pool).await.is_ok() {
            set.log_resolved();
            return Ok(set);
        }

        let latest = latest_feed_date(pool)
            .await?
            .context("No feed_entries tables found in the database")?;
        warn!(today = %today, latest = %latest, "Today's partitions missing, using latest");
        let set = Self::for_date(latest);
        set.assert_inputs_exist(pool).await?;
        set.log_resolved();
        Ok(set)
    }

    fn log_resolved(&self) {
        info!(
            feed = %self.feed_entries,
            flashpoints = %self.flash_point,
            clusters = %self.news_clusters,
            "Resolved partitioned tables"
        );
    }

    /// Both input tables must already exist; the clusters table is output and
    /// may not.
    async fn assert_inputs_exist(&self, pool: &PgPool) -> Result<()> {
        for name in [&self.feed_entries, &self.flash_point] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (
                   SELECT 1 FROM pg_tables
                   WHERE schemaname = 'public' AND tablename = $1
                 )",
            )
            .bind(name)
            .fetch_one(pool)
            .await?;
            if !exists {
                bail!("Input table '{name}' does not exist for {}", self.target_date);
            }
        }
        Ok(())
    }

    /// Create the output table if it is missing.
    pub async fn ensure_output_table(&self, pool: &PgPool) -> Result<()> {
        let table = ensure_identifier(&self.news_clusters)?;
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS "{table}" (
                id BIGSERIAL PRIMARY KEY,
                flashpoint_id uuid NOT NULL,
                cluster_id integer NOT NULL,
                summary text NOT NULL,
                article_count integer NOT NULL,
                top_domains jsonb DEFAULT '[]'::jsonb,
                languages jsonb DEFAULT '[]'::jsonb,
                urls jsonb DEFAULT '[]'::jsonb,
                images jsonb DEFAULT '[]'::jsonb,
                created_at timestamptz DEFAULT CURRENT_TIMESTAMP
            )"#
        ))
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Build a partition name like `feed_entries_20251103`.
pub fn partition_name(base: &str, date: NaiveDate) -> String {
    format!("{base}_{}", date.format("%Y%m%d"))
}

/// Reject anything that is not a plain SQL identifier before it reaches a
/// formatted query. Returns the name back for inline use.
pub fn ensure_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(name)
    } else {
        bail!("refusing to format unsafe identifier: {name:?}")
    }
}

/// Extract the date from a partitioned table name, if it carries one.
pub fn date_from_table(table_name: &str) -> Option<NaiveDate> {
    let caps = DATE_SUFFIX_RE.captures(table_name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()
}

/// Most recent date suffix across feed_entries partitions.
pub async fn latest_feed_date(pool: &PgPool) -> Result<Option<NaiveDate>> {
    let rows = sqlx::query(
        "SELECT tablename FROM pg_tables
         WHERE schemaname = 'public' AND tablename LIKE 'feed_entries_%'
         ORDER BY tablename DESC",
    )
    .fetch_all(pool)
    .await?;

    for row in rows {
        let name: String = row.try_get("tablename")?;
        if let Some(date) = date_from_table(&name) {
            return Ok(Some(date));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_names_use_compact_dates() {
        let d = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        assert_eq!(partition_name("feed_entries", d), "feed_entries_20251103");
    }

    #[test]
    fn date_round_trips_through_table_name() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(date_from_table(&partition_name("news_clusters", d)), Some(d));
        assert_eq!(date_from_table("feed_entries"), None);
        assert_eq!(date_from_table("feed_entries_2025"), None);
    }

    #[test]
    fn identifier_whitelist_blocks_injection() {
        assert!(ensure_identifier("feed_entries_20251103").is_ok());
        assert!(ensure_identifier("feed\"; DROP TABLE x; --").is_err());
        assert!(ensure_identifier("feed entries").is_err());
        assert!(ensure_identifier("").is_err());
    }
}
