use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cost/quality tiers for a pipeline run.
///
/// A: fetch + extract + enrich + dedupe only.
/// B: adds embeddings, clustering, and local extractive summaries.
/// C: adds oracle summarization and the premium pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Tier::A),
            "B" => Some(Tier::B),
            "C" => Some(Tier::C),
            _ => None,
        }
    }

    pub fn has_embeddings(&self) -> bool {
        matches!(self, Tier::B | Tier::C)
    }

    pub fn has_clustering(&self) -> bool {
        matches!(self, Tier::B | Tier::C)
    }

    pub fn has_oracle(&self) -> bool {
        matches!(self, Tier::C)
    }
}

/// Processing run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Per-entry job states. Progression is strictly forward; `Failed` is
/// reachable from any state and `SkippedDuplicate` branches off after dedupe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Fetching,
    Extracted,
    Deduped,
    Embedded,
    Clustered,
    Summarized,
    Scored,
    SkippedDuplicate,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Fetching => "fetching",
            JobStatus::Extracted => "extracted",
            JobStatus::Deduped => "deduped",
            JobStatus::Embedded => "embedded",
            JobStatus::Clustered => "clustered",
            JobStatus::Summarized => "summarized",
            JobStatus::Scored => "scored",
            JobStatus::SkippedDuplicate => "skipped_duplicate",
            JobStatus::Failed => "failed",
        }
    }
}

/// An input row from a date-partitioned feed table. Upstream fills these
/// columns; the pipeline only ever writes the enrichment columns back.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub id: Uuid,
    pub flashpoint_id: Option<Uuid>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub domain: Option<String>,
    pub sourcecountry: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub seendate: Option<DateTime<Utc>>,
}

/// A flashpoint row (read-only to the pipeline).
#[derive(Debug, Clone)]
pub struct Flashpoint {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A resolved geographic entity written into `geo_entities`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoEntity {
    pub name: String,
    pub alpha2: String,
    pub alpha3: String,
    pub mentions: u32,
}

/// One dense-ranked output row for a date-partitioned clusters table.
#[derive(Debug, Clone)]
pub struct ClusterOutput {
    pub flashpoint_id: Uuid,
    pub cluster_id: i32,
    pub summary: String,
    pub article_count: i32,
    pub top_domains: Vec<String>,
    pub languages: Vec<String>,
    pub urls: Vec<String>,
    pub images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_gates() {
        assert!(!Tier::A.has_embeddings());
        assert!(Tier::B.has_clustering());
        assert!(!Tier::B.has_oracle());
        assert!(Tier::C.has_oracle());
    }

    #[test]
    fn tier_parses_case_insensitive() {
        assert_eq!(Tier::parse("b"), Some(Tier::B));
        assert_eq!(Tier::parse(" C "), Some(Tier::C));
        assert_eq!(Tier::parse("x"), None);
    }

    #[test]
    fn job_status_round_trip_strings() {
        assert_eq!(JobStatus::SkippedDuplicate.as_str(), "skipped_duplicate");
        assert_eq!(JobStatus::Deduped.as_str(), "deduped");
    }
}
