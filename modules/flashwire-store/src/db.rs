use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect with a bounded pool. Writes to any single job row are guarded by
/// the (run_id, feed_entry_id) uniqueness constraint, not locks, so the pool
/// size only bounds throughput.
pub async fn connect(database_url: &str, pool_size: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres")
}
