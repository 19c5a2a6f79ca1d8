//! Bounded-concurrency HTTP fetcher with per-host admission control,
//! capped-exponential retries, and a per-host circuit breaker.
//!
//! Admission is layered: a global semaphore caps total in-flight requests,
//! a per-host semaphore caps concurrency to any single origin, and a
//! per-host spacing window keeps requests to the same origin apart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use flashwire_common::error::FailureReason;

const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_MAX_ATTEMPTS: u32 = 4;
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Consecutive failures before a host's breaker opens.
const BREAKER_THRESHOLD: u32 = 5;
/// How long an open breaker rejects before allowing a half-open probe.
const BREAKER_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("circuit breaker open for {0}")]
    DomainBlocked(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid url: {0}")]
    BadUrl(String),
}

impl FetchError {
    pub fn reason(&self) -> FailureReason {
        match self {
            FetchError::Timeout => FailureReason::Timeout,
            FetchError::Status(code) if *code >= 500 => FailureReason::Http5xx,
            FetchError::Status(_) => FailureReason::Http4xx,
            FetchError::DomainBlocked(_) => FailureReason::DomainBlocked,
            FetchError::Connect(_) | FetchError::BadUrl(_) => FailureReason::FetchError,
        }
    }
}

/// Outcome of a successful fetch.
#[derive(Debug)]
pub struct FetchResult {
    pub body: String,
    pub status: u16,
    pub final_url: String,
    pub duration_ms: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    pub max_concurrent: usize,
    pub per_host: usize,
    pub timeout: Duration,
    pub delay: Duration,
}

// --- Circuit breaker ---

#[derive(Debug, Default)]
struct Breaker {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probing: bool,
}

enum BreakerDecision {
    Allow,
    Probe,
    Reject,
}

impl Breaker {
    fn check(&mut self, now: Instant) -> BreakerDecision {
        match self.opened_at {
            None => BreakerDecision::Allow,
            Some(opened) => {
                if now.duration_since(opened) < BREAKER_COOLDOWN {
                    return BreakerDecision::Reject;
                }
                // Half-open: one probe at a time.
                if self.probing {
                    BreakerDecision::Reject
                } else {
                    self.probing = true;
                    BreakerDecision::Probe
                }
            }
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.probing = false;
    }

    fn record_failure(&mut self, now: Instant) {
        self.probing = false;
        if self.opened_at.is_some() {
            // A failed probe re-opens the window.
            self.opened_at = Some(now);
            return;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= BREAKER_THRESHOLD {
            self.opened_at = Some(now);
        }
    }
}

struct HostState {
    semaphore: Arc<Semaphore>,
    breaker: Mutex<Breaker>,
    /// Earliest instant the next request to this host may start.
    next_slot: Mutex<Instant>,
}

/// High-throughput URL fetcher with domain-level controls.
pub struct Fetcher {
    client: reqwest::Client,
    global: Arc<Semaphore>,
    hosts: DashMap<String, Arc<HostState>>,
    per_host: usize,
    delay: Duration,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; FlashwireBot/1.0)")
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            global: Arc::new(Semaphore::new(config.max_concurrent)),
            hosts: DashMap::new(),
            per_host: config.per_host,
            delay: config.delay,
        })
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostState {
                    semaphore: Arc::new(Semaphore::new(self.per_host)),
                    breaker: Mutex::new(Breaker::default()),
                    next_slot: Mutex::new(Instant::now()),
                })
            })
            .clone()
    }

    /// Fetch a URL with all protections. One call is one logical fetch:
    /// retries happen inside, and the breaker records a single success or
    /// failure for the whole attempt sequence.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let host = host_of(url).ok_or_else(|| FetchError::BadUrl(url.to_string()))?;
        let state = self.host_state(&host);

        let probing = {
            let mut breaker = state.breaker.lock().await;
            match breaker.check(Instant::now()) {
                BreakerDecision::Allow => false,
                BreakerDecision::Probe => {
                    debug!(host = %host, "circuit breaker half-open, probing");
                    true
                }
                BreakerDecision::Reject => return Err(FetchError::DomainBlocked(host)),
            }
        };

        let _global = self
            .global
            .acquire()
            .await
            .map_err(|_| FetchError::Connect("fetcher shut down".into()))?;
        let _host_permit = state
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Connect("fetcher shut down".into()))?;

        let started = Instant::now();
        let outcome = self.fetch_with_retries(url, &state).await;

        {
            let mut breaker = state.breaker.lock().await;
            match &outcome {
                Ok(_) => breaker.record_success(),
                Err(FetchError::BadUrl(_)) => {
                    // Not the host's fault; leave the breaker alone.
                    if probing {
                        breaker.probing = false;
                    }
                }
                Err(_) => breaker.record_failure(Instant::now()),
            }
        }

        outcome.map(|(body, status, final_url)| FetchResult {
            body,
            status,
            final_url,
            duration_ms: started.elapsed().as_millis() as i32,
        })
    }

    async fn fetch_with_retries(
        &self,
        url: &str,
        state: &HostState,
    ) -> Result<(String, u16, String), FetchError> {
        let mut last_error = FetchError::Connect("no attempts made".into());

        for attempt in 0..RETRY_MAX_ATTEMPTS {
            self.wait_for_slot(state).await;

            match self.attempt(url).await {
                Ok(result) => return Ok(result),
                Err(Attempt::Terminal(e)) => return Err(e),
                Err(Attempt::Retryable { error, retry_after }) => {
                    warn!(url, attempt = attempt + 1, error = %error, "fetch attempt failed");
                    last_error = error;
                    if attempt + 1 < RETRY_MAX_ATTEMPTS {
                        tokio::time::sleep(retry_after.unwrap_or_else(|| backoff(attempt))).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    /// Enforce the per-host spacing window, then claim the next slot.
    async fn wait_for_slot(&self, state: &HostState) {
        let wait = {
            let mut slot = state.next_slot.lock().await;
            let now = Instant::now();
            let wait = slot.saturating_duration_since(now);
            *slot = now.max(*slot) + self.delay;
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn attempt(&self, url: &str) -> Result<(String, u16, String), Attempt> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Attempt::Retryable {
                    error: FetchError::Timeout,
                    retry_after: None,
                }
            } else {
                Attempt::Retryable {
                    error: FetchError::Connect(e.to_string()),
                    retry_after: None,
                }
            }
        })?;

        let status = response.status();
        let code = status.as_u16();

        if status.is_success() {
            let final_url = response.url().to_string();
            let body = response.text().await.map_err(|e| Attempt::Retryable {
                error: FetchError::Connect(e.to_string()),
                retry_after: None,
            })?;
            return Ok((body, code, final_url));
        }

        if code == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)));
            return Err(Attempt::Retryable {
                error: FetchError::Status(code),
                retry_after,
            });
        }

        if code == 408 || status.is_server_error() {
            return Err(Attempt::Retryable {
                error: FetchError::Status(code),
                retry_after: None,
            });
        }

        // Remaining 4xx are not worth retrying.
        Err(Attempt::Terminal(FetchError::Status(code)))
    }

    /// Breaker state per host, for run metrics.
    pub fn open_breakers(&self) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .breaker
                    .try_lock()
                    .map(|b| b.opened_at.is_some())
                    .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect()
    }
}

enum Attempt {
    Terminal(FetchError),
    Retryable {
        error: FetchError,
        retry_after: Option<Duration>,
    },
}

/// Capped exponential backoff with ±25% jitter.
fn backoff(attempt: u32) -> Duration {
    let base = RETRY_BASE.mul_f64(2f64.powi(attempt as i32)).min(MAX_BACKOFF);
    let jitter = rand::rng().random_range(0.75..=1.25);
    base.mul_f64(jitter)
}

/// Lowercased host of a URL, or None when it has no host.
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}
