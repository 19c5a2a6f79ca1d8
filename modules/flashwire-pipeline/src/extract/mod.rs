//! Article text extraction.
//!
//! Four methods run in a fixed order over the parsed document; the first one
//! that yields enough non-whitespace text wins. The cascade is pure: no
//! I/O, and a method that finds nothing simply yields to the next. When all
//! methods come up short, a heuristic classifier types the failure from the
//! raw HTML.

mod classify;
mod methods;

use thiserror::Error;

use flashwire_common::error::FailureReason;

pub use classify::classify_failure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Text-density container scoring, recall-oriented.
    Density,
    /// Paragraph-parent scoring with class/id hints.
    Readability,
    /// Per-paragraph boilerplate classification.
    Paragraph,
    /// Line-based text-to-markup ratio segmentation.
    TagRatio,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Density => "density",
            ExtractionMethod::Readability => "readability",
            ExtractionMethod::Paragraph => "paragraph",
            ExtractionMethod::TagRatio => "tag_ratio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
    pub chars: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractFailure {
    #[error("page requires javascript rendering")]
    JsRequired,

    #[error("paywall detected")]
    Paywall,

    #[error("consent wall detected")]
    ConsentWall,

    #[error("best candidate below minimum length")]
    TooShort,

    #[error("no article text found")]
    NoText,

    #[error("document is not parseable html")]
    ParseError,
}

impl ExtractFailure {
    pub fn reason(&self) -> FailureReason {
        match self {
            ExtractFailure::JsRequired => FailureReason::JsRequired,
            ExtractFailure::Paywall => FailureReason::Paywall,
            ExtractFailure::ConsentWall => FailureReason::ConsentWall,
            ExtractFailure::TooShort => FailureReason::TooShort,
            ExtractFailure::NoText => FailureReason::NoText,
            ExtractFailure::ParseError => FailureReason::ParseError,
        }
    }

    /// Failures that a rendered DOM from the browser fallback might fix.
    pub fn browser_might_help(&self) -> bool {
        matches!(self, ExtractFailure::JsRequired | ExtractFailure::ConsentWall)
    }
}

/// Run the cascade. `min_len` counts non-whitespace characters.
pub fn extract_article(html: &str, min_len: usize) -> Result<Extraction, ExtractFailure> {
    if html.trim().is_empty() {
        return Err(ExtractFailure::NoText);
    }
    if html.contains('\0') || !html.contains('<') {
        return Err(ExtractFailure::ParseError);
    }

    let doc = scraper::Html::parse_document(html);

    type Method = (ExtractionMethod, fn(&scraper::Html, &str) -> Option<String>);
    const CASCADE: [Method; 4] = [
        (ExtractionMethod::Density, |doc, _| methods::by_density(doc)),
        (ExtractionMethod::Readability, |doc, _| methods::by_readability(doc)),
        (ExtractionMethod::Paragraph, |doc, _| methods::by_paragraphs(doc)),
        (ExtractionMethod::TagRatio, |_, html| methods::by_tag_ratio(html)),
    ];

    let mut best_len = 0usize;
    for (method, run) in CASCADE {
        if let Some(text) = run(&doc, html) {
            let text = sanitize(&text);
            let dense_len = non_whitespace_len(&text);
            if dense_len >= min_len {
                let chars = text.chars().count();
                return Ok(Extraction { text, method, chars });
            }
            best_len = best_len.max(dense_len);
        }
    }

    Err(classify_failure(html, best_len))
}

/// Normalize extracted text: drop control characters, collapse runs of
/// spaces/tabs, keep at most one blank line between paragraphs.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut space_run = false;
    let mut newline_run = 0u32;

    for ch in text.chars() {
        match ch {
            '\n' => {
                newline_run += 1;
                space_run = false;
                if newline_run <= 2 {
                    out.push('\n');
                }
            }
            c if c == ' ' || c == '\t' => {
                if !space_run {
                    out.push(' ');
                }
                space_run = true;
            }
            c if c.is_control() && c != '\r' => {}
            '\r' => {}
            c => {
                out.push(c);
                space_run = false;
                newline_run = 0;
            }
        }
    }

    out.trim().to_string()
}

fn non_whitespace_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_html(paragraphs: usize, words_each: usize) -> String {
        let para = "The delegation crossed the border checkpoint early on Monday morning. "
            .repeat(words_each / 10);
        let body: String = (0..paragraphs).map(|_| format!("<p>{para}</p>")).collect();
        format!(
            "<html><head><title>t</title></head><body><article>{body}</article>\
             <div class=\"sidebar\"><a href=\"/x\">more links</a></div></body></html>"
        )
    }

    #[test]
    fn cascade_extracts_article_body() {
        let html = article_html(5, 40);
        let result = extract_article(&html, 250).unwrap();
        assert!(result.text.contains("delegation crossed the border"));
        assert!(result.chars > 250);
        assert_eq!(result.method, ExtractionMethod::Density);
    }

    #[test]
    fn short_page_is_too_short() {
        let html = "<html><body><article><p>Tiny update.</p></article></body></html>";
        assert_eq!(extract_article(html, 250), Err(ExtractFailure::TooShort));
    }

    #[test]
    fn empty_html_is_no_text() {
        assert_eq!(extract_article("", 250), Err(ExtractFailure::NoText));
        assert_eq!(extract_article("   ", 250), Err(ExtractFailure::NoText));
    }

    #[test]
    fn non_html_is_parse_error() {
        assert_eq!(
            extract_article("plain text with no markup at all", 250),
            Err(ExtractFailure::ParseError)
        );
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize("a \t b\n\n\n\nc\u{0000}"), "a b\n\nc");
    }

    #[test]
    fn method_names_are_stable() {
        assert_eq!(ExtractionMethod::Density.as_str(), "density");
        assert_eq!(ExtractionMethod::TagRatio.as_str(), "tag_ratio");
    }
}
