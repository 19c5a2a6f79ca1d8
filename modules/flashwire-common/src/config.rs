use std::env;

use crate::types::Tier;

/// Component weights for the hotspot score. Must sum to roughly 1.0 but the
/// scorer does not enforce it.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub volume: f64,
    pub domains: f64,
    pub languages: f64,
    pub burst: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            volume: 0.4,
            domains: 0.25,
            languages: 0.15,
            burst: 0.2,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    pub database_pool_size: u32,

    // Run shape
    pub tier: Tier,
    pub max_entries_per_run: i64,

    // Fetcher
    pub max_concurrent_fetches: usize,
    pub per_domain_concurrency: usize,
    pub fetch_timeout_seconds: u64,
    pub request_delay_seconds: f64,

    // Extraction
    pub min_content_length: usize,

    // Dedupe
    pub minhash_threshold: f64,

    // Embedding
    pub embedding_batch_size: usize,
    pub embedding_dimension: usize,
    pub embedding_endpoint: Option<String>,
    pub embedding_api_key: String,
    pub embedding_model: String,

    // Clustering
    pub cluster_knn_k: usize,
    pub cluster_cosine_threshold: f32,

    // Summarization
    pub local_summarizer_workers: usize,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_premium_model: Option<String>,
    pub llm_max_retries: u32,
    pub premium_top_pct: f64,

    // NER
    pub ner_endpoint: Option<String>,
    pub ner_api_key: String,
    pub ner_model: String,

    // Scoring / alerts
    pub hotspot_top_pct: f64,
    pub score_weights: ScoreWeights,
    pub alert_webhook_url: Option<String>,

    // Browser fallback
    pub playwright_enabled: bool,
    pub chrome_bin: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        let defaults = ScoreWeights::default();
        Self {
            database_url: required_env("DATABASE_URL"),
            database_pool_size: env_parse("DATABASE_POOL_SIZE", 20),
            tier: env::var("PIPELINE_TIER")
                .ok()
                .and_then(|v| Tier::parse(&v))
                .unwrap_or(Tier::A),
            max_entries_per_run: env_parse("MAX_ENTRIES_PER_RUN", 10_000),
            max_concurrent_fetches: env_parse("MAX_CONCURRENT_FETCHES", 50),
            per_domain_concurrency: env_parse("PER_DOMAIN_CONCURRENCY", 3),
            fetch_timeout_seconds: env_parse("FETCH_TIMEOUT_SECONDS", 30),
            request_delay_seconds: env_parse("REQUEST_DELAY_SECONDS", 0.25),
            min_content_length: env_parse("MIN_CONTENT_LENGTH", 250),
            minhash_threshold: env_parse("MINHASH_THRESHOLD", 0.8),
            embedding_batch_size: env_parse("EMBEDDING_BATCH_SIZE", 64),
            embedding_dimension: env_parse("EMBEDDING_DIMENSION", 384),
            embedding_endpoint: env::var("EMBEDDING_ENDPOINT").ok().filter(|v| !v.is_empty()),
            embedding_api_key: env::var("EMBEDDING_API_KEY").unwrap_or_default(),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "all-MiniLM-L6-v2".to_string()),
            cluster_knn_k: env_parse("CLUSTER_KNN_K", 10),
            cluster_cosine_threshold: env_parse("CLUSTER_COSINE_THRESHOLD", 0.65),
            local_summarizer_workers: env_parse("LOCAL_SUMMARIZER_WORKERS", 8),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.together.xyz/v1".to_string()),
            llm_api_key: env::var("LLM_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .unwrap_or_default(),
            llm_model: env::var("LLM_MODEL")
                .unwrap_or_else(|_| "meta-llama/Llama-3.2-3B-Instruct-Turbo".to_string()),
            llm_premium_model: env::var("LLM_PREMIUM_MODEL").ok().filter(|v| !v.is_empty()),
            llm_max_retries: env_parse("LLM_MAX_RETRIES", 3),
            premium_top_pct: env_parse("PREMIUM_TOP_PCT", 0.10),
            ner_endpoint: env::var("NER_ENDPOINT").ok().filter(|v| !v.is_empty()),
            ner_api_key: env::var("NER_API_KEY").unwrap_or_default(),
            ner_model: env::var("NER_MODEL")
                .unwrap_or_else(|_| "distilbert-base-multilingual-cased-ner-hrl".to_string()),
            hotspot_top_pct: env_parse("HOTSPOT_TOP_PCT", 0.10),
            score_weights: ScoreWeights {
                volume: env_parse("SCORE_WEIGHT_VOLUME", defaults.volume),
                domains: env_parse("SCORE_WEIGHT_DOMAINS", defaults.domains),
                languages: env_parse("SCORE_WEIGHT_LANGUAGES", defaults.languages),
                burst: env_parse("SCORE_WEIGHT_BURST", defaults.burst),
            },
            alert_webhook_url: env::var("ALERT_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            playwright_enabled: env::var("PLAYWRIGHT_ENABLED")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            chrome_bin: env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".to_string()),
        }
    }

    /// Log which credentials are present without echoing them.
    pub fn log_redacted(&self) {
        let vars = [
            ("LLM_API_KEY", &self.llm_api_key),
            ("EMBEDDING_API_KEY", &self.embedding_api_key),
            ("NER_API_KEY", &self.ner_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
