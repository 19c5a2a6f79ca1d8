//! Clustering stage: strictly partitioned by flashpoint. Cross-flashpoint
//! clusters cannot exist because each flashpoint's vectors are loaded and
//! clustered in isolation.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use uuid::Uuid;

use flashwire_common::types::JobStatus;
use flashwire_pipeline::cluster::cluster_vectors;
use flashwire_pipeline::stats::RunStats;
use flashwire_store::clusters::MemberRow;
use flashwire_store::{ClusterStore, EntryStore, JobStore, TableSet, VectorStore};

use crate::runner::check_cancelled;

#[allow(clippy::too_many_arguments)]
pub async fn run_clustering(
    vectors: &VectorStore,
    clusters: &ClusterStore,
    jobs: &JobStore,
    entries: &EntryStore,
    tables: &TableSet,
    run_id: &str,
    k: usize,
    threshold: f32,
    cancelled: &Arc<AtomicBool>,
    stats: &mut RunStats,
) -> Result<Vec<Uuid>> {
    let flashpoints = entries.flashpoints_for_run(tables, run_id).await?;
    info!(flashpoints = flashpoints.len(), "Clustering starting");

    for &flashpoint_id in &flashpoints {
        check_cancelled(cancelled)?;

        let items = vectors
            .load_for_flashpoint(tables, flashpoint_id, run_id)
            .await
            .context("loading vectors for flashpoint")?;

        // A flashpoint with nothing embedded produces zero clusters.
        if items.is_empty() {
            continue;
        }

        let assignments = cluster_vectors(&items, k, threshold);
        let cluster_count = assignments
            .iter()
            .map(|a| a.cluster_id)
            .max()
            .unwrap_or(0) as u32;

        let members: Vec<MemberRow> = assignments
            .iter()
            .map(|a| MemberRow {
                flashpoint_id,
                cluster_uuid: a.cluster_uuid,
                feed_entry_id: a.entry_id,
                similarity: a.similarity,
            })
            .collect();
        clusters.insert_members(&members, run_id).await?;

        let member_ids: Vec<Uuid> = assignments.iter().map(|a| a.entry_id).collect();
        jobs.set_status_bulk(&member_ids, run_id, JobStatus::Clustered)
            .await?;

        stats.clusters_created += cluster_count;
        info!(
            flashpoint = %flashpoint_id,
            entries = assignments.len(),
            clusters = cluster_count,
            "Flashpoint clustered"
        );
    }

    Ok(flashpoints)
}
