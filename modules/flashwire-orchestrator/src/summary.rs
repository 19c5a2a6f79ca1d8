//! Summarization stage: group members by cluster, assign dense-ranked ids,
//! produce a summary per cluster, and write the output rows.
//!
//! Tier B stops at the local extractive summary. Tier C sends stage-1
//! summaries to the oracle, with the largest clusters optionally upgraded
//! through the premium variant, and falls back to the best stage-1 summary
//! when the oracle is exhausted.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use flashwire_common::types::{ClusterOutput, JobStatus};
use flashwire_common::Config;
use flashwire_pipeline::stats::RunStats;
use flashwire_pipeline::summarize::local::{presummarize, split_sentences};
use flashwire_pipeline::summarize::oracle::{fallback_summary, OracleFailure, OracleSummarizer};
use flashwire_pipeline::summarize::{aggregate_metadata, MemberArticle};
use flashwire_store::clusters::MemberDetail;
use flashwire_store::{ClusterStore, JobStore, TableSet};

use crate::runner::check_cancelled;

/// What the scorer needs to know about one written cluster.
#[derive(Debug, Clone)]
pub struct ClusterDigest {
    pub flashpoint_id: Uuid,
    pub cluster_id: i32,
    pub summary: String,
    pub article_count: i32,
    pub unique_domains: usize,
    pub unique_languages: usize,
    pub seendates: Vec<DateTime<Utc>>,
    pub top_domains: Vec<String>,
    pub entry_ids: Vec<Uuid>,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_summaries(
    clusters: &ClusterStore,
    jobs: &JobStore,
    tables: &TableSet,
    run_id: &str,
    flashpoints: &[Uuid],
    oracle: Option<&OracleSummarizer>,
    config: &Config,
    cancelled: &Arc<AtomicBool>,
    stats: &mut RunStats,
) -> Result<Vec<ClusterDigest>> {
    let mut digests = Vec::new();

    for &flashpoint_id in flashpoints {
        check_cancelled(cancelled)?;

        let details = clusters.member_details(tables, flashpoint_id, run_id).await?;
        if details.is_empty() {
            continue;
        }

        // Group by cluster uuid, then order clusters by size descending with
        // the smallest member id breaking ties, the same ordering the
        // clusterer used for its dense rank.
        let mut grouped: HashMap<Uuid, Vec<MemberArticle>> = HashMap::new();
        for detail in details {
            grouped
                .entry(detail.cluster_uuid)
                .or_default()
                .push(to_article(detail));
        }
        let mut ordered: Vec<(Uuid, Vec<MemberArticle>)> = grouped.into_iter().collect();
        for (_, members) in ordered.iter_mut() {
            members.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        }
        ordered.sort_by(|a, b| {
            b.1.len()
                .cmp(&a.1.len())
                .then_with(|| a.1[0].entry_id.cmp(&b.1[0].entry_id))
        });

        // Re-runs regenerate this flashpoint's rows from scratch.
        clusters.delete_output_for_flashpoint(tables, flashpoint_id).await?;

        // Premium pass: the biggest slice of clusters by member count.
        let premium_count = if oracle.map(|o| o.has_premium()).unwrap_or(false) {
            ((ordered.len() as f64 * config.premium_top_pct).ceil() as usize).min(ordered.len())
        } else {
            0
        };

        for (rank, (_cluster_uuid, members)) in ordered.iter().enumerate() {
            check_cancelled(cancelled)?;
            let cluster_id = (rank + 1) as i32;

            let stage1 = presummarize(members, config.local_summarizer_workers).await;
            let presummaries: Vec<(String, String, String)> = members
                .iter()
                .zip(stage1.iter())
                .map(|(m, s)| (m.language.clone(), m.display_title().to_string(), s.clone()))
                .collect();

            let summary = match oracle {
                Some(oracle) => {
                    let premium = rank < premium_count;
                    match oracle.summarize_cluster(&presummaries, premium).await {
                        Ok(summary) => summary,
                        Err(OracleFailure::Auth(message)) => {
                            // Credentials are broken for every cluster; stop the stage.
                            anyhow::bail!("oracle authentication failed: {message}");
                        }
                        Err(e) => {
                            warn!(
                                flashpoint = %flashpoint_id,
                                cluster_id,
                                error = %e,
                                "oracle exhausted, falling back to stage-1 summary"
                            );
                            fallback_summary(&presummaries)
                        }
                    }
                }
                None => local_cluster_summary(&stage1),
            };

            let metadata = aggregate_metadata(members);
            let unique_domains: std::collections::HashSet<&str> = members
                .iter()
                .map(|m| m.domain.as_str())
                .filter(|d| !d.is_empty())
                .collect();
            let output = ClusterOutput {
                flashpoint_id,
                cluster_id,
                summary: summary.clone(),
                article_count: members.len() as i32,
                top_domains: metadata.top_domains.clone(),
                languages: metadata.languages.clone(),
                urls: metadata.urls,
                images: metadata.images,
            };
            clusters.write_output(tables, &output).await?;
            stats.summarized += 1;

            digests.push(ClusterDigest {
                flashpoint_id,
                cluster_id,
                summary,
                article_count: members.len() as i32,
                unique_domains: unique_domains.len(),
                unique_languages: metadata.languages.len(),
                seendates: members.iter().filter_map(|m| m.seendate).collect(),
                top_domains: metadata.top_domains,
                entry_ids: members.iter().map(|m| m.entry_id).collect(),
            });
        }

        let all_ids: Vec<Uuid> = digests
            .iter()
            .filter(|d| d.flashpoint_id == flashpoint_id)
            .flat_map(|d| d.entry_ids.iter().copied())
            .collect();
        jobs.set_status_bulk(&all_ids, run_id, JobStatus::Summarized).await?;
    }

    info!(clusters = stats.summarized, "Summarization complete");
    Ok(digests)
}

fn to_article(detail: MemberDetail) -> MemberArticle {
    MemberArticle {
        entry_id: detail.feed_entry_id,
        title: detail.title.unwrap_or_default(),
        title_en: detail.title_en.unwrap_or_default(),
        content: detail.content.unwrap_or_default(),
        description: detail.description.unwrap_or_default(),
        language: detail.language.unwrap_or_default(),
        url: detail.url.unwrap_or_default(),
        domain: detail
            .domain
            .or(detail.hostname)
            .unwrap_or_default(),
        image: detail.image.filter(|i| !i.is_empty()),
        images: detail.images.unwrap_or_default(),
        seendate: detail.seendate,
    }
}

/// Tier-B cluster summary: lead sentences across member stage-1 summaries,
/// deduplicated, capped at five.
fn local_cluster_summary(stage1: &[String]) -> String {
    let mut sentences: Vec<&str> = Vec::new();
    for summary in stage1 {
        for sentence in split_sentences(summary).into_iter().take(2) {
            if sentence.len() > 30 && !sentences.contains(&sentence) {
                sentences.push(sentence);
            }
            if sentences.len() >= 5 {
                return sentences.join(" ");
            }
        }
    }
    if sentences.is_empty() {
        stage1.iter().find(|s| !s.is_empty()).cloned().unwrap_or_default()
    } else {
        sentences.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_cluster_summary_dedupes_and_caps() {
        let stage1 = vec![
            "The border crossing reopened on Tuesday after weeks of closure. Trade resumed immediately."
                .to_string(),
            "The border crossing reopened on Tuesday after weeks of closure. Local officials welcomed it."
                .to_string(),
            "A third article mentions humanitarian convoys entering the region today.".to_string(),
        ];
        let summary = local_cluster_summary(&stage1);
        assert_eq!(summary.matches("reopened on Tuesday").count(), 1);
        assert!(summary.contains("humanitarian convoys"));
        assert!(split_sentences(&summary).len() <= 5);
    }

    #[test]
    fn local_cluster_summary_of_fragments_returns_first() {
        let stage1 = vec!["tiny".to_string(), "also tiny".to_string()];
        assert_eq!(local_cluster_summary(&stage1), "tiny");
    }
}
