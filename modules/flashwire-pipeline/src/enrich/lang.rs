//! Language identification.
//!
//! A declared 2–3 letter code on the entry is trusted as-is; otherwise the
//! extracted text is identified statistically. Short texts are left
//! undetermined rather than guessed.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub const UNKNOWN_LANG: &str = "unknown";

/// Below this many characters detection is noise.
const MIN_DETECT_CHARS: usize = 50;

static LANG_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]{2,3}$").expect("valid regex"));

/// Identify the language of `text`, preferring a plausible declared code.
/// Returns an ISO-639 code, or `unknown` when nothing can be said.
pub fn detect_language(text: &str, declared: Option<&str>) -> String {
    if let Some(code) = declared {
        let code = code.trim();
        if LANG_CODE_RE.is_match(code) {
            return code.to_ascii_lowercase();
        }
    }

    if text.trim().chars().count() < MIN_DETECT_CHARS {
        return UNKNOWN_LANG.to_string();
    }

    // First 500 chars are plenty; single line keeps the detector honest.
    let sample: String = text.chars().take(500).map(|c| if c == '\n' { ' ' } else { c }).collect();

    match whatlang::detect(&sample) {
        Some(info) => {
            debug!(
                lang = info.lang().code(),
                confidence = format!("{:.4}", info.confidence()),
                "language detected"
            );
            info.lang().code().to_string()
        }
        None => UNKNOWN_LANG.to_string(),
    }
}

/// English in either 639-1 or 639-3 spelling.
pub fn is_english(code: &str) -> bool {
    matches!(code.to_ascii_lowercase().as_str(), "en" | "eng")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_code_is_trusted() {
        assert_eq!(detect_language("whatever", Some("PT")), "pt");
        assert_eq!(detect_language("whatever", Some("deu")), "deu");
    }

    #[test]
    fn malformed_declared_code_is_ignored() {
        assert_eq!(detect_language("short", Some("english!")), UNKNOWN_LANG);
    }

    #[test]
    fn short_text_is_unknown() {
        assert_eq!(detect_language("Hi there.", None), UNKNOWN_LANG);
    }

    #[test]
    fn english_prose_detects_as_english() {
        let text = "The foreign ministry announced on Tuesday that negotiators from both \
                    countries would meet again next week to discuss the disputed maritime \
                    boundary and the resumption of commercial shipping through the strait.";
        assert_eq!(detect_language(text, None), "eng");
    }

    #[test]
    fn english_aliases() {
        assert!(is_english("en"));
        assert!(is_english("ENG"));
        assert!(!is_english("fra"));
    }
}
