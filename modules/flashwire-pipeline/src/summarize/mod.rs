//! Cluster summarization: a deterministic local extractive stage for every
//! member, then (tier C) a per-cluster synthesis call to the oracle.

pub mod local;
pub mod oracle;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One cluster member's fields as the summarizer and scorer see them.
#[derive(Debug, Clone)]
pub struct MemberArticle {
    pub entry_id: Uuid,
    pub title: String,
    pub title_en: String,
    pub content: String,
    pub description: String,
    pub language: String,
    pub url: String,
    pub domain: String,
    pub image: Option<String>,
    pub images: Vec<String>,
    pub seendate: Option<DateTime<Utc>>,
}

impl MemberArticle {
    /// English title when available, original otherwise.
    pub fn display_title(&self) -> &str {
        if !self.title_en.trim().is_empty() {
            &self.title_en
        } else {
            &self.title
        }
    }

    /// Body text, falling back to the feed description.
    pub fn body(&self) -> &str {
        if !self.content.trim().is_empty() {
            &self.content
        } else {
            &self.description
        }
    }
}

/// Aggregated cluster fields for the output row.
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    pub top_domains: Vec<String>,
    pub languages: Vec<String>,
    pub urls: Vec<String>,
    pub images: Vec<String>,
}

const MAX_TOP_DOMAINS: usize = 10;
const MAX_URLS: usize = 50;
const MAX_IMAGES: usize = 20;

/// Aggregate member fields. The multiset union of member urls, domains, and
/// languages is exactly what lands on the output row (up to the caps).
pub fn aggregate_metadata(members: &[MemberArticle]) -> ClusterMetadata {
    let mut domain_counts: Vec<(String, u32)> = Vec::new();
    let mut languages: Vec<String> = Vec::new();
    let mut urls: Vec<String> = Vec::new();
    let mut images: Vec<String> = Vec::new();

    for member in members {
        let domain = if !member.domain.is_empty() {
            member.domain.clone()
        } else {
            String::new()
        };
        if !domain.is_empty() {
            match domain_counts.iter_mut().find(|(d, _)| *d == domain) {
                Some((_, count)) => *count += 1,
                None => domain_counts.push((domain, 1)),
            }
        }

        if !member.language.is_empty() && !languages.contains(&member.language) {
            languages.push(member.language.clone());
        }

        if !member.url.is_empty() && urls.len() < MAX_URLS {
            urls.push(member.url.clone());
        }

        if let Some(image) = &member.image {
            if !image.is_empty() && !images.contains(image) && images.len() < MAX_IMAGES {
                images.push(image.clone());
            }
        }
        for image in &member.images {
            if !image.is_empty() && !images.contains(image) && images.len() < MAX_IMAGES {
                images.push(image.clone());
            }
        }
    }

    // Most-mentioned domains first; alphabetical on ties for stable output.
    domain_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    languages.sort();

    ClusterMetadata {
        top_domains: domain_counts
            .into_iter()
            .take(MAX_TOP_DOMAINS)
            .map(|(d, _)| d)
            .collect(),
        languages,
        urls,
        images,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(domain: &str, lang: &str, url: &str) -> MemberArticle {
        MemberArticle {
            entry_id: Uuid::new_v4(),
            title: "t".into(),
            title_en: String::new(),
            content: "c".into(),
            description: String::new(),
            language: lang.into(),
            url: url.into(),
            domain: domain.into(),
            image: None,
            images: vec![],
            seendate: None,
        }
    }

    #[test]
    fn domains_rank_by_count_then_name() {
        let members = vec![
            member("b.com", "en", "u1"),
            member("a.com", "en", "u2"),
            member("b.com", "fr", "u3"),
        ];
        let meta = aggregate_metadata(&members);
        assert_eq!(meta.top_domains, vec!["b.com".to_string(), "a.com".to_string()]);
        assert_eq!(meta.languages, vec!["en".to_string(), "fr".to_string()]);
        assert_eq!(meta.urls.len(), 3);
    }

    #[test]
    fn images_dedupe_across_members() {
        let mut a = member("a.com", "en", "u1");
        a.image = Some("img1".into());
        a.images = vec!["img1".into(), "img2".into()];
        let meta = aggregate_metadata(&[a]);
        assert_eq!(meta.images, vec!["img1".to_string(), "img2".to_string()]);
    }

    #[test]
    fn display_title_prefers_english() {
        let mut m = member("a.com", "pt", "u");
        m.title = "Original".into();
        m.title_en = "Translated".into();
        assert_eq!(m.display_title(), "Translated");
        m.title_en = "  ".into();
        assert_eq!(m.display_title(), "Original");
    }
}
