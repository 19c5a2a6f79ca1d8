/// Failure taxonomy persisted on job rows. Every per-entry error a stage can
/// raise maps onto exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    FetchError,
    Timeout,
    Http4xx,
    Http5xx,
    DomainBlocked,
    NoText,
    TooShort,
    Paywall,
    JsRequired,
    ConsentWall,
    ParseError,
    EmbedError,
    ClusterError,
    SummarizeError,
    Cancelled,
    Unknown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::FetchError => "fetch_error",
            FailureReason::Timeout => "timeout",
            FailureReason::Http4xx => "http_4xx",
            FailureReason::Http5xx => "http_5xx",
            FailureReason::DomainBlocked => "domain_blocked",
            FailureReason::NoText => "no_text",
            FailureReason::TooShort => "too_short",
            FailureReason::Paywall => "paywall",
            FailureReason::JsRequired => "js_required",
            FailureReason::ConsentWall => "consent_wall",
            FailureReason::ParseError => "parse_error",
            FailureReason::EmbedError => "embed_error",
            FailureReason::ClusterError => "cluster_error",
            FailureReason::SummarizeError => "summarize_error",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_snake_case() {
        assert_eq!(FailureReason::Http4xx.as_str(), "http_4xx");
        assert_eq!(FailureReason::ConsentWall.as_str(), "consent_wall");
        assert_eq!(FailureReason::DomainBlocked.as_str(), "domain_blocked");
        assert_eq!(FailureReason::Cancelled.to_string(), "cancelled");
    }
}
