use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use flashwire_common::types::FeedEntry;

use crate::tables::{ensure_identifier, TableSet};

/// Queries against the date-partitioned feed tables. Every method takes the
/// run's [`TableSet`] because the physical table name changes daily.
#[derive(Clone)]
pub struct EntryStore {
    pool: PgPool,
}

/// Enrichment columns written back onto a feed entry. `None` fields are left
/// untouched. Writing `content` is what marks the entry processed.
#[derive(Debug, Default, Clone)]
pub struct EnrichmentUpdate {
    pub content: Option<String>,
    pub compressed_content: Option<String>,
    pub title_en: Option<String>,
    pub hostname: Option<String>,
    pub summary: Option<String>,
    pub entities: Option<serde_json::Value>,
    pub geo_entities: Option<serde_json::Value>,
    pub images: Option<Vec<String>>,
}

/// A (id, extracted text) pair for the dedupe pass.
#[derive(Debug)]
pub struct ExtractedBody {
    pub id: Uuid,
    pub content: String,
}

/// One row ready for embedding: non-duplicate, extracted, with text.
#[derive(Debug)]
pub struct EmbeddableEntry {
    pub id: Uuid,
    pub flashpoint_id: Uuid,
    pub title: String,
    pub content: String,
}

impl EntryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Entries awaiting processing: attached to a flashpoint and without
    /// content. `content IS NULL` is the single cross-run resume predicate.
    pub async fn select_unprocessed(
        &self,
        tables: &TableSet,
        limit: i64,
    ) -> Result<Vec<FeedEntry>> {
        let table = ensure_identifier(&tables.feed_entries)?;
        let sql = format!(
            r#"SELECT id, flashpoint_id, url, title, language, domain,
                      sourcecountry, description, image, seendate
               FROM "{table}"
               WHERE flashpoint_id IS NOT NULL AND content IS NULL
               ORDER BY id
               LIMIT $1"#
        );

        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(FeedEntry {
                id: row.try_get("id")?,
                flashpoint_id: row.try_get("flashpoint_id")?,
                url: row.try_get("url")?,
                title: row.try_get("title")?,
                language: row.try_get("language")?,
                domain: row.try_get("domain")?,
                sourcecountry: row.try_get("sourcecountry")?,
                description: row.try_get("description")?,
                image: row.try_get("image")?,
                seendate: row.try_get::<Option<DateTime<Utc>>, _>("seendate")?,
            });
        }
        Ok(entries)
    }

    /// Write enrichment fields back. JSON values go through an explicit
    /// `CAST($n AS jsonb)`; the driver binds positionally and the shorthand
    /// cast corrupts parameter substitution.
    pub async fn update_enrichment(
        &self,
        tables: &TableSet,
        entry_id: Uuid,
        update: &EnrichmentUpdate,
    ) -> Result<()> {
        let table = ensure_identifier(&tables.feed_entries)?;
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(r#"UPDATE "{table}" SET "#));
        let mut first = true;

        let mut sep = |qb: &mut QueryBuilder<Postgres>, first: &mut bool| {
            if !*first {
                qb.push(", ");
            }
            *first = false;
        };

        if let Some(content) = &update.content {
            sep(&mut qb, &mut first);
            qb.push("content = ").push_bind(content.clone());
        }
        if let Some(compressed) = &update.compressed_content {
            sep(&mut qb, &mut first);
            qb.push("compressed_content = ").push_bind(compressed.clone());
        }
        if let Some(title_en) = &update.title_en {
            sep(&mut qb, &mut first);
            qb.push("title_en = ").push_bind(title_en.clone());
        }
        if let Some(hostname) = &update.hostname {
            sep(&mut qb, &mut first);
            qb.push("hostname = ").push_bind(hostname.clone());
        }
        if let Some(summary) = &update.summary {
            sep(&mut qb, &mut first);
            qb.push("summary = ").push_bind(summary.clone());
        }
        if let Some(entities) = &update.entities {
            sep(&mut qb, &mut first);
            qb.push("entities = CAST(")
                .push_bind(entities.to_string())
                .push(" AS jsonb)");
        }
        if let Some(geo) = &update.geo_entities {
            sep(&mut qb, &mut first);
            qb.push("geo_entities = CAST(")
                .push_bind(geo.to_string())
                .push(" AS jsonb)");
        }
        if let Some(images) = &update.images {
            // images is text[], not jsonb
            sep(&mut qb, &mut first);
            qb.push("images = ").push_bind(images.clone());
        }

        if first {
            return Ok(());
        }

        sep(&mut qb, &mut first);
        qb.push("updated_at = ").push_bind(Utc::now());
        qb.push(" WHERE id = ").push_bind(entry_id);

        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Extracted bodies of this run in ascending id order. The ordering is
    /// what makes duplicate-representative selection deterministic.
    pub async fn extracted_bodies(
        &self,
        tables: &TableSet,
        run_id: &str,
    ) -> Result<Vec<ExtractedBody>> {
        let table = ensure_identifier(&tables.feed_entries)?;
        let sql = format!(
            r#"SELECT fe.id, fe.content
               FROM "{table}" fe
               JOIN feed_entry_jobs j ON j.feed_entry_id = fe.id
               WHERE j.run_id = $1 AND j.status = 'extracted' AND fe.content IS NOT NULL
               ORDER BY fe.id ASC"#
        );

        let rows = sqlx::query(&sql).bind(run_id).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(ExtractedBody {
                id: row.try_get("id")?,
                content: row.try_get("content")?,
            });
        }
        Ok(out)
    }

    /// Non-duplicate deduped entries with text, ready for the embedder.
    pub async fn embeddable_entries(
        &self,
        tables: &TableSet,
        run_id: &str,
    ) -> Result<Vec<EmbeddableEntry>> {
        let table = ensure_identifier(&tables.feed_entries)?;
        let sql = format!(
            r#"SELECT fe.id, fe.flashpoint_id,
                      COALESCE(fe.title_en, fe.title, '') AS title, fe.content
               FROM "{table}" fe
               JOIN feed_entry_jobs j ON j.feed_entry_id = fe.id
               WHERE j.run_id = $1 AND j.status = 'deduped'
                 AND j.is_duplicate = false
                 AND fe.flashpoint_id IS NOT NULL
                 AND fe.content IS NOT NULL
               ORDER BY fe.id ASC"#
        );

        let rows = sqlx::query(&sql).bind(run_id).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(EmbeddableEntry {
                id: row.try_get("id")?,
                flashpoint_id: row.try_get("flashpoint_id")?,
                title: row.try_get("title")?,
                content: row.try_get("content")?,
            });
        }
        Ok(out)
    }

    /// Distinct flashpoints with at least one surviving entry in this run.
    pub async fn flashpoints_for_run(&self, tables: &TableSet, run_id: &str) -> Result<Vec<Uuid>> {
        let table = ensure_identifier(&tables.feed_entries)?;
        let sql = format!(
            r#"SELECT DISTINCT fe.flashpoint_id
               FROM "{table}" fe
               JOIN feed_entry_jobs j ON j.feed_entry_id = fe.id
               WHERE j.run_id = $1
                 AND fe.flashpoint_id IS NOT NULL
                 AND j.is_duplicate = false
                 AND j.status NOT IN ('queued', 'fetching', 'failed')
               ORDER BY fe.flashpoint_id"#
        );

        let rows = sqlx::query(&sql).bind(run_id).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.try_get("flashpoint_id")?);
        }
        Ok(out)
    }
}
