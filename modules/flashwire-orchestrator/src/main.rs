mod clustering;
mod dedupe_pass;
mod embedding;
mod ingest;
mod runner;
mod scoring;
mod summary;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flashwire_common::{Config, Tier};
use runner::Runner;

#[derive(Parser)]
#[command(about = "Run the daily flashpoint enrichment and clustering pipeline")]
struct Cli {
    /// Target date (YYYY-MM-DD) for the feed tables. Defaults to the most
    /// recent available partition.
    #[arg(long)]
    date: Option<String>,

    /// Pipeline tier (A, B, or C). Overrides PIPELINE_TIER.
    #[arg(long)]
    tier: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("flashwire=info".parse()?))
        .init();

    info!("Flashwire pipeline starting...");

    // Load .env from the working directory (doesn't override existing vars).
    dotenv_load();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(tier) = cli.tier.as_deref() {
        config.tier = Tier::parse(tier)
            .ok_or_else(|| anyhow::anyhow!("invalid tier {tier:?}, expected A, B, or C"))?;
    }

    let target_date = match cli.date.as_deref() {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| anyhow::anyhow!("invalid --date {raw:?}, expected YYYY-MM-DD"))?,
        ),
        None => None,
    };

    config.log_redacted();

    let pool = flashwire_store::connect(&config.database_url, config.database_pool_size).await?;

    // Ctrl-C flips the cooperative cancellation flag; stages observe it at
    // their suspension points and the run closes as failed/cancelled.
    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Cancellation requested, draining in-flight work");
                cancelled.store(true, Ordering::Relaxed);
            }
        });
    }

    let runner = Runner::new(pool, config, cancelled);
    let stats = runner.run(target_date).await?;
    info!("Pipeline run complete. {stats}");

    Ok(())
}

fn dotenv_load() {
    let path = std::path::Path::new(".env");
    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if std::env::var(key.trim()).is_err() {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }
}
