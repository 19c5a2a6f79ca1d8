//! The four extraction methods. Each is independent, pure, and returns
//! `None` rather than failing loudly; the cascade decides what failure
//! means.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

static CONTAINER_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("article, main, [role=\"main\"], section, div").expect("valid selector")
});
static PARA_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, li").expect("valid selector"));
static P_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").expect("valid selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static BLOCK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, li, blockquote").expect("valid selector"));

static NEGATIVE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)comment|combx|disqus|foot|header|menu|nav|rss|shoutbox|sidebar|sponsor|advert|promo|related|share|social|widget")
        .expect("valid regex")
});
static POSITIVE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)article|body|content|entry|main|post|story|text").expect("valid regex")
});

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn link_text_len(el: &ElementRef) -> usize {
    el.select(&LINK_SEL)
        .map(|a| a.text().map(str::len).sum::<usize>())
        .sum()
}

fn class_id_hints(el: &ElementRef) -> String {
    let class = el.value().attr("class").unwrap_or("");
    let id = el.value().attr("id").unwrap_or("");
    format!("{class} {id}")
}

/// Method 1: pick the container with the highest text density (text minus
/// twice its link text) and emit its paragraphs. Recall-oriented: tables and
/// list items count.
pub fn by_density(doc: &Html) -> Option<String> {
    let mut best: Option<(i64, ElementRef)> = None;

    for el in doc.select(&CONTAINER_SEL) {
        let text_len = element_text(&el).trim().len() as i64;
        if text_len == 0 {
            continue;
        }
        let score = text_len - 2 * link_text_len(&el) as i64;
        // Strict comparison: the first container in document order wins ties.
        if best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, el));
        }
    }

    let (_, container) = best?;
    let paragraphs: Vec<String> = container
        .select(&PARA_SEL)
        .map(|p| element_text(&p).trim().to_string())
        .filter(|t| t.len() >= 25)
        .collect();

    if paragraphs.is_empty() {
        let whole = element_text(&container).trim().to_string();
        return if whole.is_empty() { None } else { Some(whole) };
    }
    Some(paragraphs.join("\n\n"))
}

/// Method 2: score each paragraph parent (commas and length up, negative
/// class/id hints out, positive hints up) and emit the best parent's
/// paragraphs.
pub fn by_readability(doc: &Html) -> Option<String> {
    let mut scores: HashMap<NodeId, f64> = HashMap::new();
    let mut parents: Vec<(NodeId, ElementRef)> = Vec::new();

    for p in doc.select(&P_SEL) {
        let parent = p.parent().and_then(ElementRef::wrap);
        let Some(parent) = parent else { continue };

        let hints = class_id_hints(&parent);
        if NEGATIVE_HINT.is_match(&hints) && !POSITIVE_HINT.is_match(&hints) {
            continue;
        }

        let text = element_text(&p);
        let text = text.trim();
        if text.len() < 20 {
            continue;
        }

        let mut score = 1.0;
        score += text.matches(',').count() as f64;
        score += (text.len() as f64 / 100.0).min(3.0);
        if POSITIVE_HINT.is_match(&hints) {
            score += 25.0;
        }

        if !scores.contains_key(&parent.id()) {
            parents.push((parent.id(), parent));
        }
        *scores.entry(parent.id()).or_insert(0.0) += score;
    }

    // Scan in document order so equal scores resolve to the earliest parent.
    let mut container: Option<(f64, &ElementRef)> = None;
    for (id, parent) in &parents {
        let score = scores[id];
        if container.map(|(best, _)| score > best).unwrap_or(true) {
            container = Some((score, parent));
        }
    }
    let (_, container) = container?;

    let paragraphs: Vec<String> = container
        .select(&P_SEL)
        .map(|p| element_text(&p).trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if paragraphs.is_empty() {
        return None;
    }
    Some(paragraphs.join("\n\n"))
}

/// Method 3: classify every block element on its own merits (length, link
/// density, sentence punctuation) and keep the good ones in document order.
pub fn by_paragraphs(doc: &Html) -> Option<String> {
    let mut good: Vec<String> = Vec::new();

    for block in doc.select(&BLOCK_SEL) {
        let text = element_text(&block);
        let text = text.trim();
        if text.len() < 80 {
            continue;
        }

        let total_len = text.len().max(1);
        let link_density = link_text_len(&block) as f64 / total_len as f64;
        if link_density > 0.33 {
            continue;
        }

        let has_sentences = text.contains(". ")
            || text.ends_with('.')
            || text.ends_with('!')
            || text.ends_with('?')
            || text.len() >= 200;
        if !has_sentences {
            continue;
        }

        good.push(text.to_string());
    }

    if good.is_empty() {
        None
    } else {
        Some(good.join("\n\n"))
    }
}

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
        .expect("valid regex")
});
static BLOCK_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|div|li|h[1-6]|blockquote|section|article)>|<br\s*/?>")
        .expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Method 4: last resort working on raw markup. Strip scripts, break on
/// block-closing tags, strip the rest, and keep lines with enough words to
/// look like prose.
pub fn by_tag_ratio(html: &str) -> Option<String> {
    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let with_breaks = BLOCK_BREAK_RE.replace_all(&without_scripts, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&stripped);

    let lines: Vec<String> = decoded
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| l.split_whitespace().count() >= 8)
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<html><body>
        <nav class="nav"><a href="/">Home</a><a href="/world">World</a></nav>
        <article class="article-body">
            <p>Officials confirmed on Tuesday that the disputed crossing had reopened, allowing hundreds of trucks through.</p>
            <p>Regional observers said the agreement, brokered late last week, remained fragile but was holding for now.</p>
        </article>
        <div class="sidebar"><p><a href="/a">One link</a> <a href="/b">another link</a> <a href="/c">third</a></p></div>
    </body></html>"#;

    #[test]
    fn density_prefers_article_over_sidebar() {
        let doc = Html::parse_document(SAMPLE);
        let text = by_density(&doc).unwrap();
        assert!(text.contains("disputed crossing"));
        assert!(!text.contains("Home"));
    }

    #[test]
    fn readability_scores_article_parent() {
        let doc = Html::parse_document(SAMPLE);
        let text = by_readability(&doc).unwrap();
        assert!(text.contains("brokered late last week"));
    }

    #[test]
    fn paragraph_method_drops_link_farms() {
        let doc = Html::parse_document(SAMPLE);
        let text = by_paragraphs(&doc).unwrap();
        assert!(text.contains("reopened"));
        assert!(!text.contains("third"));
    }

    #[test]
    fn tag_ratio_handles_raw_markup() {
        let text = by_tag_ratio(SAMPLE).unwrap();
        assert!(text.contains("disputed crossing had reopened"));
    }

    #[test]
    fn tag_ratio_strips_scripts() {
        let html = "<body><script>var these are not words in prose at all ok</script>\
                    <p>A full sentence with a reasonable number of words inside it.</p></body>";
        let text = by_tag_ratio(html).unwrap();
        assert!(!text.contains("var these"));
        assert!(text.contains("reasonable number"));
    }

    #[test]
    fn empty_document_yields_none() {
        let doc = Html::parse_document("<html><body></body></html>");
        assert!(by_density(&doc).is_none());
        assert!(by_readability(&doc).is_none());
        assert!(by_paragraphs(&doc).is_none());
    }
}
