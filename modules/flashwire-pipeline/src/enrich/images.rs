//! Image harvesting from page HTML: social-card metadata first, then body
//! images, with tracking pixels filtered out.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

const MAX_IMAGES: usize = 5;

static OG_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+property=["']og:image["'][^>]+content=["']([^"']+)["']"#)
        .expect("valid regex")
});
static TW_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+name=["']twitter:image["'][^>]+content=["']([^"']+)["']"#)
        .expect("valid regex")
});
static IMG_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("valid regex"));

static PIXEL_HINTS: [&str; 5] = ["1x1", "pixel", "tracker", "beacon", "spacer"];

/// Collect up to five usable image URLs from a page.
pub fn extract_images(html: &str, base_url: &str) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let base = url::Url::parse(base_url).ok();

    let mut push = |raw: &str, images: &mut Vec<String>, seen: &mut HashSet<String>| {
        if images.len() >= MAX_IMAGES {
            return;
        }
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        let lower = raw.to_lowercase();
        if PIXEL_HINTS.iter().any(|h| lower.contains(h)) {
            return;
        }

        let absolute = if raw.starts_with("//") {
            format!("https:{raw}")
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else if let Some(base) = &base {
            match base.join(raw) {
                Ok(u) => u.to_string(),
                Err(_) => return,
            }
        } else {
            return;
        };

        if absolute.starts_with("http") && seen.insert(absolute.clone()) {
            images.push(absolute);
        }
    };

    if let Some(caps) = OG_IMAGE_RE.captures(html) {
        push(&caps[1], &mut images, &mut seen);
    }
    if let Some(caps) = TW_IMAGE_RE.captures(html) {
        push(&caps[1], &mut images, &mut seen);
    }
    for caps in IMG_SRC_RE.captures_iter(html) {
        if images.len() >= MAX_IMAGES {
            break;
        }
        push(&caps[1], &mut images, &mut seen);
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn og_image_comes_first() {
        let html = r#"<meta property="og:image" content="https://cdn.example.com/lead.jpg">
                      <img src="/body.png">"#;
        let images = extract_images(html, "https://example.com/story");
        assert_eq!(
            images,
            vec![
                "https://cdn.example.com/lead.jpg".to_string(),
                "https://example.com/body.png".to_string()
            ]
        );
    }

    #[test]
    fn tracking_pixels_are_skipped() {
        let html = r#"<img src="https://t.example.com/1x1.gif"><img src="https://cdn.example.com/photo.jpg">"#;
        let images = extract_images(html, "https://example.com");
        assert_eq!(images, vec!["https://cdn.example.com/photo.jpg".to_string()]);
    }

    #[test]
    fn protocol_relative_and_duplicates() {
        let html = r#"<img src="//cdn.example.com/a.jpg"><img src="https://cdn.example.com/a.jpg">"#;
        let images = extract_images(html, "https://example.com");
        assert_eq!(images, vec!["https://cdn.example.com/a.jpg".to_string()]);
    }

    #[test]
    fn caps_at_five() {
        let body: String = (0..10)
            .map(|i| format!("<img src=\"https://cdn.example.com/{i}.jpg\">"))
            .collect();
        assert_eq!(extract_images(&body, "https://example.com").len(), 5);
    }
}
