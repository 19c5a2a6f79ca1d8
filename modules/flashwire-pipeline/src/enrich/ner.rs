//! Named-entity enrichment.
//!
//! The tagger itself is a remote token-classification model behind the
//! [`EntityTagger`] seam; the rest (chunking, span aggregation, the
//! persisted schema) lives here and is pure.
//!
//! Persisted shape:
//! ```json
//! {
//!   "LOC": [{"text": "Brazil", "score": 0.9987}],
//!   "ORG": [...],
//!   "meta": {"chars": 3539, "model": "...", "score": 0.96, "chunks": 1}
//! }
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Entity classes in the persisted schema, in output order.
pub const ENTITY_CLASSES: [&str; 10] = [
    "DATE", "EVENT", "GPE", "LAW", "LOC", "MONEY", "NORP", "ORG", "PERSON", "QUANTITY",
];

/// Texts shorter than this are skipped with an empty mapping.
const MIN_NER_CHARS: usize = 50;

/// Per-chunk ceiling for the remote model.
const MAX_CHUNK_CHARS: usize = 4000;

/// Keep at most this many surface forms per class.
const MAX_PER_CLASS: usize = 20;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntityMention {
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NerMeta {
    pub chars: usize,
    pub model: String,
    pub score: f64,
    pub chunks: usize,
}

#[derive(Debug, Clone)]
pub struct NerOutput {
    pub entities: BTreeMap<String, Vec<EntityMention>>,
    pub meta: NerMeta,
}

impl NerOutput {
    pub fn empty(model: &str, chars: usize) -> Self {
        let mut entities = BTreeMap::new();
        for class in ENTITY_CLASSES {
            entities.insert(class.to_string(), Vec::new());
        }
        Self {
            entities,
            meta: NerMeta {
                chars,
                model: model.to_string(),
                score: 0.0,
                chunks: 0,
            },
        }
    }

    /// JSON value for the `entities` column: classes plus the meta block.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (class, mentions) in &self.entities {
            map.insert(class.clone(), serde_json::to_value(mentions).unwrap_or_default());
        }
        map.insert(
            "meta".to_string(),
            serde_json::to_value(&self.meta).unwrap_or_default(),
        );
        serde_json::Value::Object(map)
    }
}

/// A raw model span in the usual token-classification wire shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSpan {
    pub entity_group: String,
    pub score: f64,
    pub word: String,
}

#[async_trait]
pub trait EntityTagger: Send + Sync {
    async fn tag(&self, text: &str) -> NerOutput;
    fn model_id(&self) -> &str;
}

/// Remote inference endpoint speaking the standard token-classification
/// JSON: `{"inputs": "..."}` in, `[{entity_group, score, word}]` out.
pub struct RemoteTagger {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl RemoteTagger {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn tag_chunk(&self, chunk: &str) -> anyhow::Result<Vec<RawSpan>> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "inputs": chunk }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("tagger returned {status}");
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl EntityTagger for RemoteTagger {
    async fn tag(&self, text: &str) -> NerOutput {
        if text.chars().count() < MIN_NER_CHARS {
            return NerOutput::empty(&self.model, text.chars().count());
        }

        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        let mut spans = Vec::new();
        for chunk in &chunks {
            match self.tag_chunk(chunk).await {
                Ok(mut batch) => spans.append(&mut batch),
                Err(e) => {
                    // Partial enrichment beats none; keep what we have.
                    warn!(error = %e, "entity tagging chunk failed");
                }
            }
        }

        aggregate_spans(spans, &self.model, text.chars().count(), chunks.len())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Used when no inference endpoint is configured: every entry gets an empty
/// mapping, which downstream stages treat as "nothing found".
pub struct DisabledTagger;

#[async_trait]
impl EntityTagger for DisabledTagger {
    async fn tag(&self, text: &str) -> NerOutput {
        NerOutput::empty(self.model_id(), text.chars().count())
    }

    fn model_id(&self) -> &str {
        "disabled"
    }
}

/// Split on paragraph boundaries into chunks below the model ceiling.
/// Oversized paragraphs are hard-split on char boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for para in text.split("\n\n") {
        let para_chars = para.chars().count();

        if current_chars + para_chars + 2 > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if para_chars > max_chars {
            for piece in split_chars(para, max_chars) {
                chunks.push(piece);
            }
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
            current_chars += 2;
        }
        current.push_str(para);
        current_chars += para_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(text.chars().take(max_chars).collect());
    }
    chunks
}

fn split_chars(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max_chars).map(|c| c.iter().collect()).collect()
}

/// Collapse raw spans into the persisted schema: map model labels, dedupe
/// by case-folded surface form keeping the best score, cap per class, order
/// by score descending.
pub fn aggregate_spans(
    spans: Vec<RawSpan>,
    model: &str,
    chars: usize,
    chunks: usize,
) -> NerOutput {
    // label -> (case-folded surface -> (original surface, best score))
    let mut by_class: BTreeMap<String, BTreeMap<String, (String, f64)>> = BTreeMap::new();

    for span in spans {
        let class = map_label(&span.entity_group);
        let Some(class) = class else { continue };

        let surface = span.word.replace("##", "");
        let surface = surface.trim();
        if surface.chars().count() < 2 {
            continue;
        }

        let key = surface.to_lowercase();
        let slot = by_class.entry(class.to_string()).or_default();
        match slot.get_mut(&key) {
            Some((_, best)) if *best >= span.score => {}
            _ => {
                slot.insert(key, (surface.to_string(), span.score));
            }
        }
    }

    let mut output = NerOutput::empty(model, chars);
    output.meta.chunks = chunks;

    let mut all_scores = Vec::new();
    for (class, surfaces) in by_class {
        let mut mentions: Vec<EntityMention> = surfaces
            .into_values()
            .map(|(text, score)| EntityMention {
                text,
                score: (score * 10_000.0).round() / 10_000.0,
            })
            .collect();
        mentions.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
        });
        mentions.truncate(MAX_PER_CLASS);
        all_scores.extend(mentions.iter().map(|m| m.score));
        output.entities.insert(class, mentions);
    }

    if !all_scores.is_empty() {
        let avg = all_scores.iter().sum::<f64>() / all_scores.len() as f64;
        output.meta.score = (avg * 10_000.0).round() / 10_000.0;
    }

    output
}

/// Model label -> persisted class. Unknown labels are dropped.
fn map_label(label: &str) -> Option<&'static str> {
    match label.trim().to_ascii_uppercase().as_str() {
        "PER" | "PERSON" => Some("PERSON"),
        "ORG" => Some("ORG"),
        "LOC" => Some("LOC"),
        "GPE" => Some("GPE"),
        "DATE" => Some("DATE"),
        "EVENT" => Some("EVENT"),
        "NORP" => Some("NORP"),
        "LAW" => Some("LAW"),
        "MONEY" => Some("MONEY"),
        "QUANTITY" => Some("QUANTITY"),
        // Best-effort: generic "miscellaneous" spans are usually events.
        "MISC" => Some("EVENT"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(group: &str, word: &str, score: f64) -> RawSpan {
        RawSpan {
            entity_group: group.to_string(),
            score,
            word: word.to_string(),
        }
    }

    #[test]
    fn aggregation_dedupes_case_insensitively_keeping_best_score() {
        let spans = vec![
            span("PER", "Maria Silva", 0.91),
            span("PER", "maria silva", 0.97),
            span("ORG", "##Union", 0.88),
        ];
        let out = aggregate_spans(spans, "m", 100, 1);
        let people = &out.entities["PERSON"];
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].score, 0.97);
        assert_eq!(out.entities["ORG"][0].text, "Union");
    }

    #[test]
    fn unknown_labels_and_short_words_are_dropped() {
        let spans = vec![span("WEIRD", "Thing", 0.9), span("LOC", "X", 0.9)];
        let out = aggregate_spans(spans, "m", 100, 1);
        assert!(out.entities["LOC"].is_empty());
        assert!(!out.entities.contains_key("WEIRD"));
    }

    #[test]
    fn mentions_are_ordered_by_score() {
        let spans = vec![
            span("LOC", "Brazil", 0.80),
            span("LOC", "Chile", 0.95),
            span("LOC", "Peru", 0.90),
        ];
        let out = aggregate_spans(spans, "m", 100, 1);
        let names: Vec<&str> = out.entities["LOC"].iter().map(|m| m.text.as_str()).collect();
        assert_eq!(names, vec!["Chile", "Peru", "Brazil"]);
    }

    #[test]
    fn meta_reflects_average_score() {
        let spans = vec![span("LOC", "Brazil", 0.8), span("ORG", "Senate", 1.0)];
        let out = aggregate_spans(spans, "model-x", 42, 2);
        assert_eq!(out.meta.model, "model-x");
        assert_eq!(out.meta.chunks, 2);
        assert!((out.meta.score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn chunking_respects_paragraphs() {
        let text = format!("{}\n\n{}", "a".repeat(300), "b".repeat(300));
        let chunks = chunk_text(&text, 400);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let text = "x".repeat(1000);
        let chunks = chunk_text(&text, 400);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 400));
    }

    #[tokio::test]
    async fn disabled_tagger_returns_empty_mapping() {
        let out = DisabledTagger.tag(&"long enough text ".repeat(10)).await;
        assert!(out.entities.values().all(|v| v.is_empty()));
        assert_eq!(out.meta.chunks, 0);
    }

    #[test]
    fn json_shape_includes_meta() {
        let out = NerOutput::empty("m", 5);
        let value = out.to_json();
        assert!(value.get("meta").is_some());
        assert!(value.get("PERSON").is_some());
    }
}
