//! Scoring stage: hotspot scores over the run's written clusters, top-K
//! flagging, alert dispatch, and the final job transition.

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use flashwire_common::types::JobStatus;
use flashwire_common::Config;
use flashwire_pipeline::alerts::{AlertDispatcher, AlertPayload};
use flashwire_pipeline::score::{flag_top, score_cluster};
use flashwire_pipeline::stats::RunStats;
use flashwire_store::{FlashpointStore, JobStore, TableSet};

use crate::summary::ClusterDigest;

#[allow(clippy::too_many_arguments)]
pub async fn run_scoring(
    digests: &[ClusterDigest],
    flashpoints: &FlashpointStore,
    jobs: &JobStore,
    tables: &TableSet,
    run_id: &str,
    config: &Config,
    dispatcher: &dyn AlertDispatcher,
    stats: &mut RunStats,
) -> Result<()> {
    if digests.is_empty() {
        info!("No clusters to score");
        return Ok(());
    }

    let mut scores: Vec<_> = digests
        .iter()
        .map(|d| {
            score_cluster(
                d.cluster_id,
                d.article_count as usize,
                d.unique_domains,
                d.unique_languages,
                &d.seendates,
                &config.score_weights,
            )
        })
        .collect();
    flag_top(&mut scores, config.hotspot_top_pct);

    // Flagged clusters become alert payloads, titled from their flashpoint.
    let mut payloads = Vec::new();
    for (digest, score) in digests.iter().zip(scores.iter()) {
        if !score.flagged {
            continue;
        }
        let title = flashpoints
            .get(tables, digest.flashpoint_id)
            .await?
            .and_then(|fp| fp.title)
            .unwrap_or_else(|| digest.flashpoint_id.to_string());

        payloads.push(AlertPayload {
            flashpoint_id: digest.flashpoint_id,
            flashpoint_title: title,
            cluster_id: digest.cluster_id,
            summary: digest.summary.clone(),
            article_count: digest.article_count,
            hotspot_score: score.score,
            top_domains: digest.top_domains.clone(),
        });
    }

    stats.flagged = payloads.len() as u32;

    // Alert delivery is best-effort; a dead webhook never fails the run.
    if let Err(e) = dispatcher.dispatch(run_id, &payloads).await {
        warn!(error = %e, "alert dispatch failed");
    }

    let all_ids: Vec<Uuid> = digests
        .iter()
        .flat_map(|d| d.entry_ids.iter().copied())
        .collect();
    jobs.set_status_bulk(&all_ids, run_id, JobStatus::Scored).await?;

    info!(
        clusters = digests.len(),
        flagged = stats.flagged,
        "Scoring complete"
    );
    Ok(())
}
