//! Headless-browser fallback for hosts that serve script shells or consent
//! walls to plain HTTP clients. Shells out to Chromium `--dump-dom`; the
//! rendered DOM then goes through the normal extraction cascade.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Each Chromium instance is heavy; keep the fan-out small.
const MAX_CONCURRENT_BROWSERS: usize = 2;
const BROWSER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BrowserFetcher {
    semaphore: Semaphore,
    chrome_bin: String,
}

impl BrowserFetcher {
    pub fn new(chrome_bin: &str) -> Self {
        info!(chrome_bin, "Browser fallback enabled (max_concurrent={MAX_CONCURRENT_BROWSERS})");
        Self {
            semaphore: Semaphore::new(MAX_CONCURRENT_BROWSERS),
            chrome_bin: chrome_bin.to_string(),
        }
    }

    /// Render a page and return its DOM as HTML. Empty output is returned
    /// as-is; the extractor classifies it.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url).context("Invalid URL")?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Only http/https URLs allowed, got: {}", parsed.scheme());
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("Browser semaphore closed"))?;

        info!(url, fetcher = "browser", "Rendering page");

        let tmp_dir = tempfile::tempdir().context("Failed to create temp profile dir")?;
        let output = tokio::time::timeout(
            BROWSER_TIMEOUT,
            tokio::process::Command::new(&self.chrome_bin)
                .args([
                    "--headless",
                    "--no-sandbox",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    &format!("--user-data-dir={}", tmp_dir.path().display()),
                    "--dump-dom",
                    url,
                ])
                .output(),
        )
        .await
        .context(format!("Browser timed out after 30s for {url}"))?
        .context(format!("Failed to launch browser for {url}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url, fetcher = "browser", stderr = %stderr, "Browser exited with error");
            return Ok(String::new());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
