//! Per-entry enrichers: language identification, title translation,
//! hostname derivation, named entities, country resolution, and page
//! images. All of them degrade instead of failing the entry.

pub mod geo;
pub mod images;
pub mod lang;
pub mod ner;
pub mod translate;

/// Hostname of a URL with any `www.` prefix and port stripped.
pub fn extract_hostname(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_strips_www_and_port() {
        assert_eq!(
            extract_hostname("https://www.Example.COM:8443/news/1"),
            Some("example.com".to_string())
        );
        assert_eq!(
            extract_hostname("http://sub.domain.org/x"),
            Some("sub.domain.org".to_string())
        );
        assert_eq!(extract_hostname("garbage"), None);
    }
}
