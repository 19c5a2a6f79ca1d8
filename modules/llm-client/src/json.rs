//! Fault-tolerant reading of model output that was *asked* to be JSON.
//!
//! Ladder: strict parse → repair pass (fence stripping, object slicing,
//! trailing-comma removal) → relaxed field scrape. Callers only see `None`
//! when every rung fails.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid regex"));

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

static SUMMARY_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""summary"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
});

/// Parse model output into a JSON value, repairing common damage.
pub fn parse_loose(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // 1. Strict
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Some(v);
    }

    // 2. Inside a markdown fence
    if let Some(caps) = FENCE_RE.captures(raw) {
        if let Ok(v) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(v);
        }
    }

    // 3. Slice from first `{` to last `}` and drop trailing commas
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let sliced = &raw[start..=end];
    if let Ok(v) = serde_json::from_str::<Value>(sliced) {
        return Some(v);
    }
    let repaired = TRAILING_COMMA_RE.replace_all(sliced, "$1");
    serde_json::from_str::<Value>(&repaired).ok()
}

/// Pull the `summary` string out of model output, however mangled.
pub fn extract_summary(raw: &str) -> Option<String> {
    if let Some(v) = parse_loose(raw) {
        // Direct object, or first element of an array of objects.
        let obj = match &v {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        if let Some(s) = obj.get("summary").and_then(|s| s.as_str()) {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }

    // Relaxed: scrape the field straight out of the text.
    if let Some(caps) = SUMMARY_FIELD_RE.captures(raw) {
        let unescaped = caps[1].replace("\\\"", "\"").replace("\\n", " ");
        let s = unescaped.trim().to_string();
        if !s.is_empty() {
            return Some(s);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses() {
        let s = extract_summary(r#"{"summary": "Troops massed at the border."}"#);
        assert_eq!(s.as_deref(), Some("Troops massed at the border."));
    }

    #[test]
    fn fenced_json_parses() {
        let raw = "Here you go:\n```json\n{\"summary\": \"Ceasefire talks resumed.\"}\n```";
        assert_eq!(extract_summary(raw).as_deref(), Some("Ceasefire talks resumed."));
    }

    #[test]
    fn trailing_comma_is_repaired() {
        let raw = r#"{"summary": "Port reopened after strikes.",}"#;
        assert_eq!(
            extract_summary(raw).as_deref(),
            Some("Port reopened after strikes.")
        );
    }

    #[test]
    fn preamble_and_epilogue_are_sliced_away() {
        let raw = "Sure! {\"summary\": \"Aid convoy crossed.\"} Hope that helps.";
        assert_eq!(extract_summary(raw).as_deref(), Some("Aid convoy crossed."));
    }

    #[test]
    fn relaxed_scrape_survives_broken_structure() {
        let raw = r#"{"summary": "Dam \"overflow\" contained", "extra": oops"#;
        assert_eq!(
            extract_summary(raw).as_deref(),
            Some(r#"Dam "overflow" contained"#)
        );
    }

    #[test]
    fn array_wrapped_object() {
        let raw = r#"[{"summary": "Elections delayed."}]"#;
        assert_eq!(extract_summary(raw).as_deref(), Some("Elections delayed."));
    }

    #[test]
    fn garbage_yields_none() {
        assert!(extract_summary("no json here at all").is_none());
        assert!(extract_summary("").is_none());
    }
}
