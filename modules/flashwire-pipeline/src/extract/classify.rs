//! Heuristic failure classification for pages the cascade could not read.
//!
//! Pattern sets are checked in a fixed order so a page showing several
//! symptoms always classifies the same way: paywall markers beat consent
//! banners beat script shells.

use std::sync::LazyLock;

use regex::Regex;

use super::ExtractFailure;

static PAYWALL_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)subscribe\s+to\s+continue|paywall|premium\s+content").expect("valid regex"),
        Regex::new(r"(?i)sign\s+in\s+to\s+read|create.{0,40}account.{0,40}to.{0,40}continue")
            .expect("valid regex"),
    ]
});

static CONSENT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)cookie[- ]?consent|cookie[- ]?banner|gdpr").expect("valid regex"),
        Regex::new(r"(?i)accept\s+(all\s+)?cookies|manage\s+(your\s+)?preferences")
            .expect("valid regex"),
    ]
});

static JS_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?is)<noscript[^>]*>.*?enable\s+javascript").expect("valid regex"),
        Regex::new(r"window\.__NUXT__").expect("valid regex"),
        Regex::new(r#"(?i)<div[^>]*id=["'](app|root)["'][^>]*>\s*</div>"#).expect("valid regex"),
        Regex::new(r"(?i)react-root|__next").expect("valid regex"),
    ]
});

static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Type the failure from the raw HTML. `best_len` is the longest
/// non-whitespace candidate any method produced.
pub fn classify_failure(html: &str, best_len: usize) -> ExtractFailure {
    if PAYWALL_RES.iter().any(|re| re.is_match(html)) {
        return ExtractFailure::Paywall;
    }

    if CONSENT_RES.iter().any(|re| re.is_match(html)) {
        return ExtractFailure::ConsentWall;
    }

    if JS_RES.iter().any(|re| re.is_match(html)) && body_text_len(html) < 100 {
        return ExtractFailure::JsRequired;
    }

    if best_len > 0 {
        ExtractFailure::TooShort
    } else {
        ExtractFailure::NoText
    }
}

/// Visible text length of the body, tags stripped. A script-framework marker
/// only means "needs rendering" when the served body is essentially empty.
fn body_text_len(html: &str) -> usize {
    let Some(caps) = BODY_RE.captures(html) else {
        return 0;
    };
    TAG_RE
        .replace_all(&caps[1], " ")
        .split_whitespace()
        .map(str::len)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paywall_wins_over_other_markers() {
        let html = "<body>Subscribe to continue reading. Accept cookies.</body>";
        assert_eq!(classify_failure(html, 0), ExtractFailure::Paywall);
    }

    #[test]
    fn consent_banner_detected() {
        let html = "<body><div class=\"cookie-banner\">We value your privacy</div></body>";
        assert_eq!(classify_failure(html, 0), ExtractFailure::ConsentWall);
    }

    #[test]
    fn spa_shell_is_js_required() {
        let html = "<html><body><div id=\"root\"></div><script src=\"app.js\"></script></body></html>";
        assert_eq!(classify_failure(html, 0), ExtractFailure::JsRequired);
    }

    #[test]
    fn spa_marker_with_real_body_is_not_js_required() {
        let long_body = "word ".repeat(100);
        let html = format!("<body><div id=\"__next\">{long_body}</div></body>");
        assert_eq!(classify_failure(&html, 0), ExtractFailure::NoText);
    }

    #[test]
    fn short_candidate_is_too_short() {
        let html = "<body><p>Brief.</p></body>";
        assert_eq!(classify_failure(html, 6), ExtractFailure::TooShort);
    }

    #[test]
    fn nothing_at_all_is_no_text() {
        assert_eq!(classify_failure("<body></body>", 0), ExtractFailure::NoText);
    }
}
