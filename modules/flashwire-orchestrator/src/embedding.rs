//! Embedding stage. Vectors are content-addressed by entry id: entries that
//! already have one (from an earlier run) are not re-embedded.

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use flashwire_common::error::FailureReason;
use flashwire_common::types::JobStatus;
use flashwire_pipeline::embed::{embedding_input, TextEmbedder};
use flashwire_pipeline::stats::RunStats;
use flashwire_store::{EntryStore, JobStore, TableSet, VectorStore};

pub async fn run_embed(
    embedder: &dyn TextEmbedder,
    vectors: &VectorStore,
    entries: &EntryStore,
    jobs: &JobStore,
    tables: &TableSet,
    run_id: &str,
    stats: &mut RunStats,
) -> Result<()> {
    let rows = entries.embeddable_entries(tables, run_id).await?;
    if rows.is_empty() {
        info!("No entries to embed");
        return Ok(());
    }

    let all_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let existing = vectors.existing_ids(&all_ids).await?;

    let (reused, fresh): (Vec<_>, Vec<_>) = rows.into_iter().partition(|r| existing.contains(&r.id));

    if !reused.is_empty() {
        let ids: Vec<Uuid> = reused.iter().map(|r| r.id).collect();
        jobs.set_status_bulk(&ids, run_id, JobStatus::Embedded).await?;
        stats.reused_vectors += ids.len() as u32;
    }

    if fresh.is_empty() {
        info!(reused = stats.reused_vectors, "Embedding complete (all reused)");
        return Ok(());
    }

    let texts: Vec<String> = fresh
        .iter()
        .map(|r| embedding_input(&r.title, &r.content))
        .collect();

    match embedder.embed_batch(&texts).await {
        Ok(batch_vectors) => {
            for (row, vector) in fresh.iter().zip(batch_vectors.iter()) {
                vectors.upsert(row.id, vector, embedder.model_id()).await?;
            }
            let ids: Vec<Uuid> = fresh.iter().map(|r| r.id).collect();
            jobs.set_status_bulk(&ids, run_id, JobStatus::Embedded).await?;
            stats.embedded += ids.len() as u32;
        }
        Err(e) => {
            // The batch failed as a unit; every member fails the same way
            // and the run carries on.
            warn!(error = %e, count = fresh.len(), "embedding batch failed");
            for row in &fresh {
                jobs.mark_failed(row.id, run_id, FailureReason::EmbedError, &e.to_string())
                    .await?;
            }
            stats.failed += fresh.len() as u32;
        }
    }

    info!(
        embedded = stats.embedded,
        reused = stats.reused_vectors,
        "Embedding complete"
    );
    Ok(())
}
