use std::collections::HashSet;

use anyhow::Result;
use pgvector::Vector;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::tables::{ensure_identifier, TableSet};

/// The `feed_entry_vectors` store. Content-addressed: keyed by entry id, not
/// by run, so a later run reprocessing an entry reuses its prior vector.
#[derive(Clone)]
pub struct VectorStore {
    pool: PgPool,
}

impl VectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert one embedding. Concurrent writers coordinate through the
    /// primary-key conflict, last write wins.
    pub async fn upsert(&self, entry_id: Uuid, embedding: &[f32], model: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO feed_entry_vectors (feed_entry_id, embedding, model_name)
             VALUES ($1, $2, $3)
             ON CONFLICT (feed_entry_id)
             DO UPDATE SET embedding = EXCLUDED.embedding, model_name = EXCLUDED.model_name",
        )
        .bind(entry_id)
        .bind(Vector::from(embedding.to_vec()))
        .bind(model)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Which of these entries already have a stored vector.
    pub async fn existing_ids(&self, entry_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        if entry_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT feed_entry_id FROM feed_entry_vectors WHERE feed_entry_id = ANY($1)",
        )
        .bind(entry_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashSet::with_capacity(rows.len());
        for row in rows {
            out.insert(row.try_get("feed_entry_id")?);
        }
        Ok(out)
    }

    /// All vectors for one flashpoint's non-duplicate entries in a run,
    /// ordered by entry id.
    pub async fn load_for_flashpoint(
        &self,
        tables: &TableSet,
        flashpoint_id: Uuid,
        run_id: &str,
    ) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let table = ensure_identifier(&tables.feed_entries)?;
        let sql = format!(
            r#"SELECT v.feed_entry_id, v.embedding
               FROM feed_entry_vectors v
               JOIN "{table}" fe ON fe.id = v.feed_entry_id
               JOIN feed_entry_jobs j ON j.feed_entry_id = fe.id
               WHERE fe.flashpoint_id = $1
                 AND j.run_id = $2
                 AND j.is_duplicate = false
               ORDER BY v.feed_entry_id ASC"#
        );

        let rows = sqlx::query(&sql)
            .bind(flashpoint_id)
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("feed_entry_id")?;
            let vector: Vector = row.try_get("embedding")?;
            out.push((id, vector.to_vec()));
        }
        Ok(out)
    }
}
