//! Stage 2: cluster synthesis through the external text oracle.
//!
//! One call per cluster per run. Transient failures retry with exponential
//! backoff; exhausted retries surface as a typed failure so the caller can
//! fall back to the best stage-1 summary. Credential rejections are not
//! per-cluster problems and propagate as such.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use llm_client::{json, ChatClient, ChatError};

const ORACLE_SYSTEM_PROMPT: &str = "You are a news intelligence analyst. You will receive \
short summaries of several articles covering the same event. Write a single comprehensive, \
factual summary in English covering who, what, where, when, and why. Synthesize across \
languages where needed and stay objective.\n\
Respond with JSON only, in exactly this shape: {\"summary\": \"...\"}";

const RETRY_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum OracleFailure {
    /// Provider rejected credentials. An outage for the whole stage.
    #[error("oracle authentication failed: {0}")]
    Auth(String),

    /// Retries exhausted for this cluster only.
    #[error("oracle exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Oracle-backed cluster summarizer with an optional premium variant.
pub struct OracleSummarizer {
    client: ChatClient,
    premium: Option<ChatClient>,
    max_retries: u32,
}

impl OracleSummarizer {
    pub fn new(client: ChatClient, premium: Option<ChatClient>, max_retries: u32) -> Self {
        Self {
            client,
            premium,
            max_retries,
        }
    }

    pub fn has_premium(&self) -> bool {
        self.premium.is_some()
    }

    /// Summarize one cluster from its members' stage-1 summaries.
    /// `premium` selects the higher-quality variant when configured.
    pub async fn summarize_cluster(
        &self,
        presummaries: &[(String, String, String)], // (language, title, stage-1 summary)
        premium: bool,
    ) -> Result<String, OracleFailure> {
        let client = if premium {
            self.premium.as_ref().unwrap_or(&self.client)
        } else {
            &self.client
        };

        let payload = build_payload(presummaries);
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            match client.chat_completion(ORACLE_SYSTEM_PROMPT, &payload).await {
                Ok(raw) => match json::extract_summary(&raw) {
                    Some(summary) => {
                        if premium {
                            info!(model = client.model(), "premium oracle summary accepted");
                        }
                        return Ok(summary);
                    }
                    None => {
                        last_error = "unparseable oracle output".to_string();
                        warn!(attempt = attempt + 1, "oracle output failed every parse rung");
                    }
                },
                Err(ChatError::Auth(message)) => {
                    return Err(OracleFailure::Auth(message));
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt = attempt + 1, error = %e, "oracle call failed");
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(backoff(attempt)).await;
            }
        }

        Err(OracleFailure::Exhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

/// Compact bullet payload: one line per member, language-tagged.
pub fn build_payload(presummaries: &[(String, String, String)]) -> String {
    let mut lines = Vec::with_capacity(presummaries.len());
    for (language, title, summary) in presummaries.iter().take(15) {
        let language = if language.is_empty() { "unknown" } else { language };
        lines.push(format!("- [{language}] {title}: {summary}"));
    }
    lines.join("\n")
}

/// Terminal-failure fallback: the longest non-empty stage-1 summary.
pub fn fallback_summary(presummaries: &[(String, String, String)]) -> String {
    presummaries
        .iter()
        .map(|(_, _, summary)| summary.trim())
        .filter(|s| !s.is_empty())
        .max_by_key(|s| s.chars().count())
        .unwrap_or("")
        .to_string()
}

fn backoff(attempt: u32) -> Duration {
    let base = RETRY_BASE.mul_f64(2f64.powi(attempt as i32));
    base.mul_f64(rand::rng().random_range(0.75..=1.25))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pre(lang: &str, title: &str, summary: &str) -> (String, String, String) {
        (lang.to_string(), title.to_string(), summary.to_string())
    }

    #[test]
    fn payload_is_language_tagged_bullets() {
        let payload = build_payload(&[
            pre("en", "Border reopens", "Trucks crossed for the first time in weeks."),
            pre("", "Untagged", "Something happened."),
        ]);
        assert!(payload.starts_with("- [en] Border reopens: Trucks crossed"));
        assert!(payload.contains("- [unknown] Untagged:"));
    }

    #[test]
    fn payload_caps_members() {
        let many: Vec<_> = (0..30).map(|i| pre("en", "t", &format!("s{i}"))).collect();
        assert_eq!(build_payload(&many).lines().count(), 15);
    }

    #[test]
    fn fallback_picks_longest_non_empty() {
        let summaries = [
            pre("en", "a", "short"),
            pre("en", "b", ""),
            pre("en", "c", "the considerably longer stage one summary"),
        ];
        assert_eq!(
            fallback_summary(&summaries),
            "the considerably longer stage one summary"
        );
    }

    #[test]
    fn fallback_on_all_empty_is_empty() {
        assert_eq!(fallback_summary(&[pre("en", "a", "  ")]), "");
        assert_eq!(fallback_summary(&[]), "");
    }
}
