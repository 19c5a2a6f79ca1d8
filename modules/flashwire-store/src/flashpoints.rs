use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use flashwire_common::types::Flashpoint;

use crate::tables::{ensure_identifier, TableSet};

/// Read-only access to the date-partitioned flashpoint tables.
#[derive(Clone)]
pub struct FlashpointStore {
    pool: PgPool,
}

impl FlashpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, tables: &TableSet, flashpoint_id: Uuid) -> Result<Option<Flashpoint>> {
        let table = ensure_identifier(&tables.flash_point)?;
        let sql = format!(r#"SELECT id, title, description FROM "{table}" WHERE id = $1"#);

        let row = sqlx::query(&sql)
            .bind(flashpoint_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(Flashpoint {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
            }),
            None => None,
        })
    }
}
