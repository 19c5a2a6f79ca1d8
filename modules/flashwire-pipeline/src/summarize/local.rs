//! Stage 1: local extractive summaries.
//!
//! Lead sentences from each article, deduplicated, capped at ~80 words.
//! Deterministic given the same input. The per-article work is CPU-bound
//! and fans out to a bounded blocking pool so it never starves the I/O
//! scheduler.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::MemberArticle;

/// Word budget for one article summary.
pub const SUMMARY_MAX_WORDS: usize = 80;

/// Sentences shorter than this carry no information worth extracting.
const MIN_SENTENCE_CHARS: usize = 30;

/// Lead sentences taken per article before the word cap applies.
const LEAD_SENTENCES: usize = 3;

/// Extractive summary of one article body.
pub fn extractive_summary(text: &str, max_words: usize) -> String {
    let mut picked: Vec<&str> = Vec::new();
    let mut words = 0usize;

    for sentence in split_sentences(text).into_iter().take(LEAD_SENTENCES * 2) {
        let sentence = sentence.trim();
        if sentence.len() < MIN_SENTENCE_CHARS || picked.contains(&sentence) {
            continue;
        }
        let sentence_words = sentence.split_whitespace().count();
        if words + sentence_words > max_words && !picked.is_empty() {
            break;
        }
        picked.push(sentence);
        words += sentence_words;
        if picked.len() >= LEAD_SENTENCES || words >= max_words {
            break;
        }
    }

    if picked.is_empty() {
        // Fall back to a raw word prefix for fragmentary text.
        return text
            .split_whitespace()
            .take(max_words)
            .collect::<Vec<_>>()
            .join(" ");
    }

    picked.join(" ")
}

/// Sentence segmentation on terminal punctuation followed by whitespace.
/// Deliberately simple; the summarizer only needs lead sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut prev_terminal = false;

    for (i, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            let sentence = text[start..i].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = i;
            prev_terminal = false;
            continue;
        }
        prev_terminal = matches!(ch, '.' | '!' | '?' | '。');
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Summarize each member on a blocking pool bounded to `workers` threads.
/// Output order matches input order.
pub async fn presummarize(members: &[MemberArticle], workers: usize) -> Vec<String> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::with_capacity(members.len());

    for member in members {
        let body = member.body().to_string();
        let title = member.display_title().to_string();
        let semaphore = semaphore.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore open");
            tokio::task::spawn_blocking(move || {
                let summary = extractive_summary(&body, SUMMARY_MAX_WORDS);
                if summary.is_empty() {
                    title
                } else {
                    summary
                }
            })
            .await
            .unwrap_or_default()
        }));
    }

    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(handle.await.unwrap_or_default());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const TEXT: &str = "Artillery exchanges continued along the northern frontier on Thursday. \
        Both governments accused each other of initiating the escalation. Observers from the \
        monitoring mission reported at least a dozen impacts near the crossing. A fourth \
        sentence that should not be needed at all. And a fifth one for good measure.";

    #[test]
    fn summary_takes_lead_sentences() {
        let summary = extractive_summary(TEXT, 80);
        assert!(summary.starts_with("Artillery exchanges"));
        assert!(summary.contains("monitoring mission"));
        assert!(!summary.contains("fifth one"));
    }

    #[test]
    fn summary_respects_word_cap() {
        let summary = extractive_summary(TEXT, 15);
        assert!(summary.split_whitespace().count() <= 15);
        assert!(!summary.is_empty());
    }

    #[test]
    fn fragmentary_text_falls_back_to_prefix() {
        let summary = extractive_summary("short fragment no punctuation", 80);
        assert_eq!(summary, "short fragment no punctuation");
    }

    #[test]
    fn sentences_split_on_terminals() {
        let sentences = split_sentences("One here. Two there! Three? Four");
        assert_eq!(sentences, vec!["One here.", "Two there!", "Three?", "Four"]);
    }

    #[test]
    fn summary_is_deterministic() {
        assert_eq!(extractive_summary(TEXT, 80), extractive_summary(TEXT, 80));
    }

    #[tokio::test]
    async fn presummarize_preserves_order() {
        let make = |body: &str| MemberArticle {
            entry_id: Uuid::new_v4(),
            title: "fallback title".into(),
            title_en: String::new(),
            content: body.into(),
            description: String::new(),
            language: "en".into(),
            url: String::new(),
            domain: String::new(),
            image: None,
            images: vec![],
            seendate: None,
        };
        let members = vec![
            make("First article body sentence that is long enough to extract from here."),
            make("Second article body sentence that is also long enough to extract."),
        ];
        let summaries = presummarize(&members, 2).await;
        assert!(summaries[0].starts_with("First article"));
        assert!(summaries[1].starts_with("Second article"));
    }

    #[tokio::test]
    async fn empty_body_falls_back_to_title() {
        let member = MemberArticle {
            entry_id: Uuid::new_v4(),
            title: "Headline only".into(),
            title_en: String::new(),
            content: String::new(),
            description: String::new(),
            language: "en".into(),
            url: String::new(),
            domain: String::new(),
            image: None,
            images: vec![],
            seendate: None,
        };
        let summaries = presummarize(&[member], 1).await;
        assert_eq!(summaries[0], "Headline only");
    }
}
