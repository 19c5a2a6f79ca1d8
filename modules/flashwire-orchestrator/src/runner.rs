//! The run controller: owns the run lifecycle and dispatches the stages in
//! order, recording counters and timings along the way.
//!
//! Per-entry failures are the stages' business and never surface here;
//! anything that does bubble up is stage-global and fails the whole run
//! with its root cause on the run row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use flashwire_common::Config;
use flashwire_pipeline::alerts::{AlertDispatcher, LogDispatcher, WebhookDispatcher};
use flashwire_pipeline::browser::BrowserFetcher;
use flashwire_pipeline::embed::{HashEmbedder, RemoteEmbedder, TextEmbedder};
use flashwire_pipeline::enrich::ner::{DisabledTagger, EntityTagger, RemoteTagger};
use flashwire_pipeline::enrich::translate::{NoTranslator, OracleTranslator, TitleTranslator};
use flashwire_pipeline::fetch::{FetchConfig, Fetcher};
use flashwire_pipeline::stats::RunStats;
use flashwire_pipeline::summarize::oracle::OracleSummarizer;
use flashwire_store::runs::RunCounters;
use flashwire_store::{
    ClusterStore, EntryStore, FlashpointStore, JobStore, RunStore, TableSet, VectorStore,
};
use llm_client::{ChatClient, EmbeddingsClient};

use crate::{clustering, dedupe_pass, embedding, ingest, scoring, summary};

pub fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        anyhow::bail!("cancelled");
    }
    Ok(())
}

pub struct Runner {
    pool: PgPool,
    config: Config,
    cancelled: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(pool: PgPool, config: Config, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            pool,
            config,
            cancelled,
        }
    }

    pub async fn run(&self, target_date: Option<NaiveDate>) -> Result<RunStats> {
        let runs = RunStore::new(self.pool.clone());

        // A predecessor that died mid-run must not stay RUNNING forever.
        runs.sweep_abandoned().await?;

        let tables = TableSet::resolve(&self.pool, target_date).await?;
        tables.ensure_output_table(&self.pool).await?;

        let run_id = new_run_id();
        runs.create(&run_id, self.config.tier.as_str(), tables.target_date)
            .await?;
        info!(
            run_id = %run_id,
            tier = self.config.tier.as_str(),
            target_date = %tables.target_date,
            "Processing run opened"
        );

        match self.execute(&run_id, &tables).await {
            Ok((stats, metrics)) => {
                let counters = RunCounters {
                    total_entries: stats.selected as i32,
                    processed_entries: stats.processed as i32,
                    failed_entries: stats.failed as i32,
                    dedupe_skipped: stats.deduped as i32,
                    clusters_created: stats.clusters_created as i32,
                };
                runs.mark_completed(&run_id, counters, metrics).await?;
                info!(run_id = %run_id, "Processing run completed");
                Ok(stats)
            }
            Err(e) => {
                // Best effort: the close must not mask the root cause.
                if let Err(close_err) = runs.mark_failed(&run_id, &e.to_string()).await {
                    tracing::error!(error = %close_err, "Failed to mark run as failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run_id: &str,
        tables: &TableSet,
    ) -> Result<(RunStats, serde_json::Value)> {
        let config = &self.config;
        let mut stats = RunStats::default();
        let mut timings: Vec<(&'static str, f64)> = Vec::new();
        let run_started = Instant::now();

        let entries = EntryStore::new(self.pool.clone());
        let jobs = JobStore::new(self.pool.clone());

        // 1. Select unprocessed entries for the target date.
        let t0 = Instant::now();
        let batch = entries
            .select_unprocessed(tables, config.max_entries_per_run)
            .await?;
        stats.selected = batch.len() as u32;
        timings.push(("selection", t0.elapsed().as_secs_f64()));
        info!(selected = batch.len(), "Entries selected");

        if batch.is_empty() {
            return Ok((stats, self.metrics_json(run_id, tables, &jobs, &timings).await?));
        }

        // 2. Claim jobs; the uniqueness constraint makes this idempotent.
        let t0 = Instant::now();
        let entry_ids: Vec<Uuid> = batch.iter().map(|e| e.id).collect();
        stats.claimed = jobs.claim_bulk(&entry_ids, run_id).await? as u32;
        timings.push(("claiming", t0.elapsed().as_secs_f64()));
        info!(claimed = stats.claimed, "Jobs claimed");

        // 3. Ingest: fetch, extract, enrich, write back.
        let t0 = Instant::now();
        let ingest_ctx = self.build_ingest_context(&entries, &jobs)?;
        ingest::run_ingest(&ingest_ctx, tables, run_id, batch, &mut stats).await?;
        timings.push(("ingest", t0.elapsed().as_secs_f64()));
        check_cancelled(&self.cancelled)?;

        // 4. Dedupe pass over the run's extracted bodies.
        let t0 = Instant::now();
        dedupe_pass::run_dedupe(
            &jobs,
            &entries,
            tables,
            run_id,
            config.minhash_threshold,
            &mut stats,
        )
        .await?;
        timings.push(("dedupe", t0.elapsed().as_secs_f64()));
        check_cancelled(&self.cancelled)?;

        // 5-7. Embed, cluster, summarize (tier-gated).
        if config.tier.has_embeddings() {
            let t0 = Instant::now();
            let embedder = self.build_embedder();
            let vectors = VectorStore::new(self.pool.clone());
            embedding::run_embed(
                embedder.as_ref(),
                &vectors,
                &entries,
                &jobs,
                tables,
                run_id,
                &mut stats,
            )
            .await?;
            timings.push(("embed", t0.elapsed().as_secs_f64()));
            check_cancelled(&self.cancelled)?;
        }

        let mut digests = Vec::new();
        if config.tier.has_clustering() {
            let clusters = ClusterStore::new(self.pool.clone());
            let vectors = VectorStore::new(self.pool.clone());

            let t0 = Instant::now();
            let flashpoints = clustering::run_clustering(
                &vectors,
                &clusters,
                &jobs,
                &entries,
                tables,
                run_id,
                config.cluster_knn_k,
                config.cluster_cosine_threshold,
                &self.cancelled,
                &mut stats,
            )
            .await?;
            timings.push(("cluster", t0.elapsed().as_secs_f64()));
            check_cancelled(&self.cancelled)?;

            let t0 = Instant::now();
            let oracle = self.build_oracle();
            digests = summary::run_summaries(
                &clusters,
                &jobs,
                tables,
                run_id,
                &flashpoints,
                oracle.as_ref(),
                config,
                &self.cancelled,
                &mut stats,
            )
            .await?;
            timings.push(("summarize", t0.elapsed().as_secs_f64()));
            check_cancelled(&self.cancelled)?;
        }

        // 8. Score and alert.
        let t0 = Instant::now();
        let flashpoint_store = FlashpointStore::new(self.pool.clone());
        let dispatcher = self.build_dispatcher();
        scoring::run_scoring(
            &digests,
            &flashpoint_store,
            &jobs,
            tables,
            run_id,
            config,
            dispatcher.as_ref(),
            &mut stats,
        )
        .await?;
        timings.push(("score", t0.elapsed().as_secs_f64()));

        timings.push(("total", run_started.elapsed().as_secs_f64()));
        let metrics = self.metrics_json(run_id, tables, &jobs, &timings).await?;
        Ok((stats, metrics))
    }

    fn build_ingest_context(
        &self,
        entries: &EntryStore,
        jobs: &JobStore,
    ) -> Result<ingest::IngestContext> {
        let config = &self.config;

        let fetcher = Fetcher::new(FetchConfig {
            max_concurrent: config.max_concurrent_fetches,
            per_host: config.per_domain_concurrency,
            timeout: std::time::Duration::from_secs(config.fetch_timeout_seconds),
            delay: std::time::Duration::from_secs_f64(config.request_delay_seconds),
        })?;

        let browser = config
            .playwright_enabled
            .then(|| Arc::new(BrowserFetcher::new(&config.chrome_bin)));

        let tagger: Arc<dyn EntityTagger> = match &config.ner_endpoint {
            Some(endpoint) => Arc::new(RemoteTagger::new(
                endpoint,
                &config.ner_api_key,
                &config.ner_model,
            )),
            None => Arc::new(DisabledTagger),
        };

        let translator: Arc<dyn TitleTranslator> = if config.llm_api_key.is_empty() {
            Arc::new(NoTranslator)
        } else {
            Arc::new(OracleTranslator::new(
                ChatClient::new(&config.llm_api_key, &config.llm_model)
                    .with_base_url(&config.llm_base_url),
            ))
        };

        Ok(ingest::IngestContext {
            entries: entries.clone(),
            jobs: jobs.clone(),
            fetcher: Arc::new(fetcher),
            browser,
            tagger,
            translator,
            min_content_length: config.min_content_length,
            fetch_window: config.max_concurrent_fetches,
            cancelled: self.cancelled.clone(),
        })
    }

    fn build_embedder(&self) -> Box<dyn TextEmbedder> {
        let config = &self.config;
        match &config.embedding_endpoint {
            Some(endpoint) => Box::new(RemoteEmbedder::new(
                EmbeddingsClient::new(&config.embedding_api_key, &config.embedding_model, endpoint),
                config.embedding_dimension,
                config.embedding_batch_size,
            )),
            None => Box::new(HashEmbedder::new(config.embedding_dimension)),
        }
    }

    fn build_oracle(&self) -> Option<OracleSummarizer> {
        let config = &self.config;
        if !config.tier.has_oracle() || config.llm_api_key.is_empty() {
            return None;
        }
        let client = ChatClient::new(&config.llm_api_key, &config.llm_model)
            .with_base_url(&config.llm_base_url);
        let premium = config.llm_premium_model.as_ref().map(|model| {
            ChatClient::new(&config.llm_api_key, model).with_base_url(&config.llm_base_url)
        });
        Some(OracleSummarizer::new(client, premium, config.llm_max_retries))
    }

    fn build_dispatcher(&self) -> Box<dyn AlertDispatcher> {
        match &self.config.alert_webhook_url {
            Some(url) => Box::new(WebhookDispatcher::new(url)),
            None => Box::new(LogDispatcher),
        }
    }

    async fn metrics_json(
        &self,
        run_id: &str,
        tables: &TableSet,
        jobs: &JobStore,
        timings: &[(&'static str, f64)],
    ) -> Result<serde_json::Value> {
        let status_counts = jobs.status_counts(run_id).await?;
        let timing_map: serde_json::Map<String, serde_json::Value> = timings
            .iter()
            .map(|(stage, secs)| {
                (
                    stage.to_string(),
                    serde_json::json!((secs * 100.0).round() / 100.0),
                )
            })
            .collect();

        Ok(serde_json::json!({
            "tier": self.config.tier.as_str(),
            "target_date": tables.target_date.to_string(),
            "tables": {
                "feed_entries": tables.feed_entries,
                "flash_point": tables.flash_point,
                "news_clusters": tables.news_clusters,
            },
            "status_counts": status_counts,
            "timings_s": timing_map,
        }))
    }
}

/// Lexicographically sortable run id encoding the UTC start.
fn new_run_id() -> String {
    let now = Utc::now();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_sort_by_creation_time() {
        let id = new_run_id();
        assert!(id.starts_with("run_20"));
        // run_YYYYMMDD_HHMMSS_xxxxxxxx
        assert_eq!(id.len(), "run_".len() + 15 + 1 + 8);
    }

    #[test]
    fn cancellation_flag_trips_check() {
        let flag = AtomicBool::new(false);
        assert!(check_cancelled(&flag).is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(check_cancelled(&flag).is_err());
    }
}
