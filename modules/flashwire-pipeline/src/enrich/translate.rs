//! Title translation. Only the title crosses the language boundary; body
//! text stays in its source language and the summarizer synthesizes across
//! languages later.

use async_trait::async_trait;
use tracing::warn;

use llm_client::ChatClient;

use super::lang::is_english;

const TRANSLATE_SYSTEM_PROMPT: &str =
    "You translate news headlines into English. Reply with the translation only, \
     no quotes and no commentary.";

#[async_trait]
pub trait TitleTranslator: Send + Sync {
    /// Translate a title to English, or `None` when translation is
    /// unavailable for this text.
    async fn translate(&self, title: &str, source_lang: &str) -> Option<String>;
}

/// Translator backed by the chat oracle.
pub struct OracleTranslator {
    client: ChatClient,
}

impl OracleTranslator {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TitleTranslator for OracleTranslator {
    async fn translate(&self, title: &str, source_lang: &str) -> Option<String> {
        match self.client.chat_completion(TRANSLATE_SYSTEM_PROMPT, title).await {
            Ok(text) => {
                let text = text.trim().trim_matches('"').trim();
                if text.is_empty() {
                    None
                } else {
                    Some(text.to_string())
                }
            }
            Err(e) => {
                warn!(source_lang, error = %e, "title translation failed, keeping original");
                None
            }
        }
    }
}

/// No model available: everything falls through to the original title.
pub struct NoTranslator;

#[async_trait]
impl TitleTranslator for NoTranslator {
    async fn translate(&self, _title: &str, _source_lang: &str) -> Option<String> {
        None
    }
}

/// Produce `title_en`. English titles pass through; for everything else a
/// failed or unavailable translation degrades to the original title.
pub async fn translate_title(
    translator: &dyn TitleTranslator,
    title: &str,
    source_lang: &str,
) -> String {
    if title.trim().is_empty() {
        return String::new();
    }
    if is_english(source_lang) {
        return title.to_string();
    }
    match translator.translate(title, source_lang).await {
        Some(translated) => translated,
        None => title.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn english_titles_pass_through() {
        let title = translate_title(&NoTranslator, "Border talks resume", "en").await;
        assert_eq!(title, "Border talks resume");
    }

    #[tokio::test]
    async fn unavailable_translation_copies_original() {
        let title = translate_title(&NoTranslator, "Les négociations reprennent", "fr").await;
        assert_eq!(title, "Les négociations reprennent");
    }

    #[tokio::test]
    async fn empty_title_stays_empty() {
        assert_eq!(translate_title(&NoTranslator, "  ", "fr").await, "");
    }

    struct FixedTranslator(&'static str);

    #[async_trait]
    impl TitleTranslator for FixedTranslator {
        async fn translate(&self, _t: &str, _l: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn translator_output_is_used_for_non_english() {
        let title = translate_title(&FixedTranslator("Talks resume"), "会談再開", "ja").await;
        assert_eq!(title, "Talks resume");
    }
}
