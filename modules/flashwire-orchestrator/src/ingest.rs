//! Ingest stage: fetch → extract → enrich → write back, per entry.
//!
//! Fetching runs ahead under the fetcher's own admission control; extraction
//! and enrichment consume from a bounded window so a fast fetcher cannot
//! pile up unprocessed bodies. Every per-entry failure is caught here and
//! persisted as a typed job failure; only storage-level errors escape and
//! fail the run.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use base64::Engine;
use dashmap::DashSet;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use tracing::{debug, info};

use flashwire_common::types::{FeedEntry, JobStatus};
use flashwire_pipeline::browser::BrowserFetcher;
use flashwire_pipeline::enrich::geo::{geo_entities_json, resolve_geo_entities};
use flashwire_pipeline::enrich::images::extract_images;
use flashwire_pipeline::enrich::lang::detect_language;
use flashwire_pipeline::enrich::ner::EntityTagger;
use flashwire_pipeline::enrich::translate::{translate_title, TitleTranslator};
use flashwire_pipeline::enrich::extract_hostname;
use flashwire_pipeline::extract::{extract_article, Extraction};
use flashwire_pipeline::fetch::{host_of, FetchError, Fetcher};
use flashwire_pipeline::stats::RunStats;
use flashwire_store::entries::EnrichmentUpdate;
use flashwire_store::{EntryStore, JobStore, TableSet};

/// Concurrent extract/enrich slots. Also the size of the fetched-but-
/// unprocessed window: when all slots are busy the fetch stream stops
/// being polled, which is the backpressure.
const PROCESS_CONCURRENCY: usize = 8;

pub struct IngestContext {
    pub entries: EntryStore,
    pub jobs: JobStore,
    pub fetcher: Arc<Fetcher>,
    pub browser: Option<Arc<BrowserFetcher>>,
    pub tagger: Arc<dyn EntityTagger>,
    pub translator: Arc<dyn TitleTranslator>,
    pub min_content_length: usize,
    /// Fetch futures polled ahead of the processing slots. Matches the
    /// fetcher's global cap so admission control, not the stream, is what
    /// limits the network.
    pub fetch_window: usize,
    pub cancelled: Arc<AtomicBool>,
}

struct Counters {
    processed: AtomicU32,
    failed: AtomicU32,
}

pub async fn run_ingest(
    ctx: &IngestContext,
    tables: &TableSet,
    run_id: &str,
    batch: Vec<FeedEntry>,
    stats: &mut RunStats,
) -> Result<()> {
    info!(total = batch.len(), "Ingest starting");

    let entry_ids: Vec<uuid::Uuid> = batch.iter().map(|e| e.id).collect();
    ctx.jobs
        .set_status_bulk(&entry_ids, run_id, JobStatus::Fetching)
        .await?;

    let counters = Counters {
        processed: AtomicU32::new(0),
        failed: AtomicU32::new(0),
    };
    let storage_error: std::sync::Mutex<Option<anyhow::Error>> = std::sync::Mutex::new(None);
    // Hosts whose plain-HTTP bodies classified as needing a browser; later
    // entries from these hosts are routed straight to the fallback.
    let render_hosts: Arc<DashSet<String>> = Arc::new(DashSet::new());

    let fetches = futures::stream::iter(batch.into_iter().map(|entry| {
        let fetcher = ctx.fetcher.clone();
        let browser = ctx.browser.clone();
        let render_hosts = render_hosts.clone();
        let cancelled = ctx.cancelled.clone();
        async move {
            if cancelled.load(Ordering::Relaxed) {
                return (entry, Err(FetchError::Connect("cancelled".into())));
            }
            let Some(url) = entry.url.clone() else {
                return (entry, Err(FetchError::BadUrl("entry has no url".into())));
            };

            // Known render-needing host: skip the plain client entirely.
            if let (Some(browser), Some(host)) = (&browser, host_of(&url)) {
                if render_hosts.contains(&host) {
                    let started = std::time::Instant::now();
                    match browser.fetch(&url).await {
                        Ok(body) => {
                            let result = flashwire_pipeline::fetch::FetchResult {
                                body,
                                status: 200,
                                final_url: url.clone(),
                                duration_ms: started.elapsed().as_millis() as i32,
                            };
                            return (entry, Ok(result));
                        }
                        Err(e) => {
                            return (entry, Err(FetchError::Connect(e.to_string())));
                        }
                    }
                }
            }

            let result = fetcher.fetch(&url).await;
            (entry, result)
        }
    }))
    .buffer_unordered(ctx.fetch_window.max(PROCESS_CONCURRENCY));

    fetches
        .for_each_concurrent(PROCESS_CONCURRENCY, |(entry, fetched)| {
            let counters = &counters;
            let storage_error = &storage_error;
            let render_hosts = render_hosts.clone();
            async move {
                if ctx.cancelled.load(Ordering::Relaxed) {
                    return;
                }
                match process_entry(ctx, tables, run_id, &entry, fetched, &render_hosts).await {
                    Ok(true) => {
                        counters.processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(false) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        // Storage failure is stage-global: remember the root
                        // cause and stop feeding the stream.
                        tracing::error!(entry_id = %entry.id, error = %e, "storage error during ingest");
                        storage_error.lock().expect("mutex poisoned").get_or_insert(e);
                        ctx.cancelled.store(true, Ordering::Relaxed);
                    }
                }
            }
        })
        .await;

    if let Some(e) = storage_error.into_inner().expect("mutex poisoned") {
        return Err(e);
    }
    if ctx.cancelled.load(Ordering::Relaxed) {
        anyhow::bail!("cancelled");
    }

    stats.processed += counters.processed.load(Ordering::Relaxed);
    stats.failed += counters.failed.load(Ordering::Relaxed);

    let blocked = ctx.fetcher.open_breakers();
    if !blocked.is_empty() {
        info!(hosts = ?blocked, "Circuit breakers still open after ingest");
    }

    info!(
        processed = stats.processed,
        failed = stats.failed,
        "Ingest complete"
    );
    Ok(())
}

/// Returns Ok(true) when the entry was enriched, Ok(false) when it failed
/// and the failure was persisted. Err is reserved for storage errors.
async fn process_entry(
    ctx: &IngestContext,
    tables: &TableSet,
    run_id: &str,
    entry: &FeedEntry,
    fetched: Result<flashwire_pipeline::fetch::FetchResult, FetchError>,
    render_hosts: &DashSet<String>,
) -> Result<bool> {
    let fetch_result = match fetched {
        Ok(result) => result,
        Err(e) => {
            ctx.jobs
                .mark_failed(entry.id, run_id, e.reason(), &e.to_string())
                .await?;
            return Ok(false);
        }
    };

    let fetch_ms = fetch_result.duration_ms;
    let extract_started = std::time::Instant::now();

    // Extraction cascade, with one browser retry for render-classified
    // failures when the fallback is enabled.
    let extraction = match extract_article(&fetch_result.body, ctx.min_content_length) {
        Ok(extraction) => extraction,
        Err(failure) if failure.browser_might_help() && ctx.browser.is_some() => {
            let url = entry.url.as_deref().unwrap_or_default();
            if let Some(host) = host_of(url) {
                render_hosts.insert(host);
            }
            match retry_with_browser(ctx, url, ctx.min_content_length).await {
                Some(extraction) => extraction,
                None => {
                    ctx.jobs
                        .mark_failed(entry.id, run_id, failure.reason(), &failure.to_string())
                        .await?;
                    return Ok(false);
                }
            }
        }
        Err(failure) => {
            ctx.jobs
                .mark_failed(entry.id, run_id, failure.reason(), &failure.to_string())
                .await?;
            return Ok(false);
        }
    };

    let extract_ms = extract_started.elapsed().as_millis() as i32;
    let text = &extraction.text;

    // Enrichers: all degradation, no failure.
    let language = detect_language(text, entry.language.as_deref());
    let title = entry.title.clone().unwrap_or_default();
    let title_en = translate_title(ctx.translator.as_ref(), &title, &language).await;
    let hostname = entry.url.as_deref().and_then(extract_hostname);

    let ner = ctx.tagger.tag(text).await;
    let geo = resolve_geo_entities(&ner, entry.sourcecountry.as_deref());

    let images = entry
        .url
        .as_deref()
        .map(|url| extract_images(&fetch_result.body, url))
        .unwrap_or_default();

    let update = EnrichmentUpdate {
        content: Some(text.clone()),
        compressed_content: Some(compress_content(text)),
        title_en: Some(title_en),
        hostname,
        summary: None,
        entities: Some(ner.to_json()),
        geo_entities: Some(geo_entities_json(&geo)),
        images: if images.is_empty() { None } else { Some(images) },
    };

    ctx.entries.update_enrichment(tables, entry.id, &update).await?;
    ctx.jobs
        .record_extraction(
            entry.id,
            run_id,
            extraction.method.as_str(),
            extraction.chars as i32,
            fetch_ms,
            extract_ms,
        )
        .await?;

    debug!(
        entry_id = %entry.id,
        method = extraction.method.as_str(),
        chars = extraction.chars,
        lang = %language,
        "entry enriched"
    );
    Ok(true)
}

async fn retry_with_browser(
    ctx: &IngestContext,
    url: &str,
    min_len: usize,
) -> Option<Extraction> {
    let browser = ctx.browser.as_ref()?;
    match browser.fetch(url).await {
        Ok(html) if !html.is_empty() => extract_article(&html, min_len).ok(),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(url, error = %e, "browser fallback failed");
            None
        }
    }
}

/// gzip + base64, the storage form of `compressed_content`.
pub fn compress_content(text: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(text.as_bytes());
    let compressed = encoder.finish().unwrap_or_default();
    base64::engine::general_purpose::STANDARD.encode(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn compressed_content_round_trips() {
        let text = "multilingual body text, repeated a bit. ".repeat(20);
        let encoded = compress_content(&text);

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, text);
    }
}
