//! Alert dispatch for flagged hotspot clusters. The dispatcher is a
//! plug-in seam; the webhook transport is the one shipped here.

use async_trait::async_trait;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub flashpoint_id: Uuid,
    pub flashpoint_title: String,
    pub cluster_id: i32,
    pub summary: String,
    pub article_count: i32,
    pub hotspot_score: f64,
    pub top_domains: Vec<String>,
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, run_id: &str, flagged: &[AlertPayload]) -> Result<()>;
}

/// POSTs one JSON document per run to a configured webhook.
pub struct WebhookDispatcher {
    http: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    run_id: &'a str,
    alerts: &'a [AlertPayload],
}

#[async_trait]
impl AlertDispatcher for WebhookDispatcher {
    async fn dispatch(&self, run_id: &str, flagged: &[AlertPayload]) -> Result<()> {
        if flagged.is_empty() {
            return Ok(());
        }

        let body = WebhookBody {
            kind: "hotspot_alert",
            run_id,
            alerts: flagged,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .context("Alert webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Alert webhook returned {status}");
        }

        info!(count = flagged.len(), "Dispatched hotspot alerts");
        Ok(())
    }
}

/// Default when no webhook is configured: alerts land in the log.
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn dispatch(&self, run_id: &str, flagged: &[AlertPayload]) -> Result<()> {
        for alert in flagged {
            warn!(
                run_id,
                flashpoint = %alert.flashpoint_id,
                cluster_id = alert.cluster_id,
                score = alert.hotspot_score,
                articles = alert.article_count,
                "HOTSPOT {}",
                alert.flashpoint_title
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_dispatcher_accepts_everything() {
        let alerts = vec![AlertPayload {
            flashpoint_id: Uuid::new_v4(),
            flashpoint_title: "Strait tensions".into(),
            cluster_id: 1,
            summary: "s".into(),
            article_count: 12,
            hotspot_score: 0.77,
            top_domains: vec!["example.com".into()],
        }];
        assert!(LogDispatcher.dispatch("run_x", &alerts).await.is_ok());
        assert!(LogDispatcher.dispatch("run_x", &[]).await.is_ok());
    }
}
