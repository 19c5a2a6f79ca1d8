use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use flashwire_common::types::ClusterOutput;

use crate::tables::{ensure_identifier, TableSet};

/// Writes `cluster_members` (sidecar) and the date-partitioned
/// `news_clusters` output rows.
#[derive(Clone)]
pub struct ClusterStore {
    pool: PgPool,
}

/// One membership row to insert.
#[derive(Debug, Clone)]
pub struct MemberRow {
    pub flashpoint_id: Uuid,
    pub cluster_uuid: Uuid,
    pub feed_entry_id: Uuid,
    pub similarity: f64,
}

/// A cluster member joined with its feed entry, as loaded for the
/// summarization and scoring stages.
#[derive(Debug, Clone)]
pub struct MemberDetail {
    pub cluster_uuid: Uuid,
    pub feed_entry_id: Uuid,
    pub similarity: f64,
    pub title: Option<String>,
    pub title_en: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub hostname: Option<String>,
    pub language: Option<String>,
    pub image: Option<String>,
    pub images: Option<Vec<String>>,
    pub seendate: Option<DateTime<Utc>>,
}

impl ClusterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert membership rows, ignoring entries already placed by this run.
    /// Conflict target is UNIQUE(feed_entry_id, run_id), so re-running the
    /// clustering stage is idempotent.
    pub async fn insert_members(&self, members: &[MemberRow], run_id: &str) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let flashpoints: Vec<Uuid> = members.iter().map(|m| m.flashpoint_id).collect();
        let cluster_uuids: Vec<Uuid> = members.iter().map(|m| m.cluster_uuid).collect();
        let entry_ids: Vec<Uuid> = members.iter().map(|m| m.feed_entry_id).collect();
        let similarities: Vec<f64> = members.iter().map(|m| m.similarity).collect();

        sqlx::query(
            "INSERT INTO cluster_members
                 (flashpoint_id, cluster_uuid, feed_entry_id, run_id, similarity)
             SELECT t.f, t.c, t.e, $4, t.s
             FROM unnest($1::uuid[], $2::uuid[], $3::uuid[], $5::float8[]) AS t(f, c, e, s)
             ON CONFLICT DO NOTHING",
        )
        .bind(&flashpoints)
        .bind(&cluster_uuids)
        .bind(&entry_ids)
        .bind(run_id)
        .bind(&similarities)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a flashpoint's members for this run, joined with entry fields.
    pub async fn member_details(
        &self,
        tables: &TableSet,
        flashpoint_id: Uuid,
        run_id: &str,
    ) -> Result<Vec<MemberDetail>> {
        let table = ensure_identifier(&tables.feed_entries)?;
        let sql = format!(
            r#"SELECT cm.cluster_uuid, cm.feed_entry_id, cm.similarity,
                      fe.title, fe.title_en, fe.content, fe.description,
                      fe.url, fe.domain, fe.hostname, fe.language,
                      fe.image, fe.images, fe.seendate
               FROM cluster_members cm
               JOIN "{table}" fe ON fe.id = cm.feed_entry_id
               WHERE cm.flashpoint_id = $1 AND cm.run_id = $2
               ORDER BY cm.cluster_uuid, cm.similarity DESC, cm.feed_entry_id"#
        );

        let rows = sqlx::query(&sql)
            .bind(flashpoint_id)
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(MemberDetail {
                cluster_uuid: row.try_get("cluster_uuid")?,
                feed_entry_id: row.try_get("feed_entry_id")?,
                similarity: row.try_get("similarity")?,
                title: row.try_get("title")?,
                title_en: row.try_get("title_en")?,
                content: row.try_get("content")?,
                description: row.try_get("description")?,
                url: row.try_get("url")?,
                domain: row.try_get("domain")?,
                hostname: row.try_get("hostname")?,
                language: row.try_get("language")?,
                image: row.try_get("image")?,
                images: row.try_get("images")?,
                seendate: row.try_get("seendate")?,
            });
        }
        Ok(out)
    }

    /// Delete existing output rows for a flashpoint so a re-run regenerates
    /// them cleanly.
    pub async fn delete_output_for_flashpoint(
        &self,
        tables: &TableSet,
        flashpoint_id: Uuid,
    ) -> Result<u64> {
        let table = ensure_identifier(&tables.news_clusters)?;
        let sql = format!(r#"DELETE FROM "{table}" WHERE flashpoint_id = $1"#);
        let result = sqlx::query(&sql)
            .bind(flashpoint_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Write one dense-ranked output row. JSON arrays are bound as text and
    /// cast server-side; the shorthand cast is unsafe with positional binds.
    pub async fn write_output(&self, tables: &TableSet, output: &ClusterOutput) -> Result<()> {
        let table = ensure_identifier(&tables.news_clusters)?;
        let sql = format!(
            r#"INSERT INTO "{table}"
                   (flashpoint_id, cluster_id, summary, article_count,
                    top_domains, languages, urls, images)
               VALUES ($1, $2, $3, $4,
                       CAST($5 AS jsonb), CAST($6 AS jsonb),
                       CAST($7 AS jsonb), CAST($8 AS jsonb))"#
        );

        sqlx::query(&sql)
            .bind(output.flashpoint_id)
            .bind(output.cluster_id)
            .bind(&output.summary)
            .bind(output.article_count)
            .bind(serde_json::to_string(&output.top_domains)?)
            .bind(serde_json::to_string(&output.languages)?)
            .bind(serde_json::to_string(&output.urls)?)
            .bind(serde_json::to_string(&output.images)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
