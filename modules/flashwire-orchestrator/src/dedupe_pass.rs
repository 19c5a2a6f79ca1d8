//! Dedupe stage: a sequential pass over the run's extracted bodies in
//! ascending entry-id order. Sequential on purpose: representative
//! selection must follow id order, not completion order.

use anyhow::Result;
use tracing::info;

use flashwire_pipeline::dedupe::DedupeIndex;
use flashwire_pipeline::stats::RunStats;
use flashwire_store::jobs::DedupeRecord;
use flashwire_store::{EntryStore, JobStore, TableSet};

pub async fn run_dedupe(
    jobs: &JobStore,
    entries: &EntryStore,
    tables: &TableSet,
    run_id: &str,
    threshold: f64,
    stats: &mut RunStats,
) -> Result<()> {
    let mut index = DedupeIndex::new(threshold);

    // Entries processed by earlier runs over this date take precedence as
    // representatives, so a resumed run cannot re-admit their duplicates.
    let seeded = jobs.prior_signatures(tables.target_date, run_id).await?;
    for prior in &seeded {
        index.seed(
            prior.feed_entry_id,
            &prior.content_hash,
            prior.minhash.as_deref(),
        );
    }
    if !seeded.is_empty() {
        info!(seeded = seeded.len(), "Dedupe index seeded from prior runs");
    }

    let bodies = entries.extracted_bodies(tables, run_id).await?;
    let total = bodies.len();

    let mut duplicates = 0u32;
    for body in bodies {
        let verdict = index.check_and_register(body.id, &body.content);
        if verdict.is_duplicate() {
            duplicates += 1;
        }
        let record = DedupeRecord {
            content_hash: verdict.content_hash.clone(),
            minhash: Some(verdict.signature_hex.clone()),
            is_duplicate: verdict.is_duplicate(),
            duplicate_of: verdict.duplicate_of,
        };
        jobs.record_dedupe(body.id, run_id, &record).await?;
    }

    stats.deduped += duplicates;
    info!(total, duplicates, "Dedupe pass complete");
    Ok(())
}
