//! Response and page classification.

use crate::rules::RuleSet;

/// What a list endpoint response means for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// An obfuscated payload ready for [`decrypt`](crate::decrypt())
    Valid(String),
    /// The service answered with nothing for this query
    Empty,
    /// The verification interstitial was served
    ChallengeRequired,
    /// Throttled or unavailable; back off without refreshing
    RateLimited,
    /// The token or cookies are no longer accepted
    StaleSession,
    /// Some other HTML page. `needs_refresh` is set when the page asks for a
    /// reload of the session page.
    SystemError { needs_refresh: bool },
}

/// What the content endpoint's page currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    /// Nothing rendered yet
    Pending,
    /// The document script is present
    Content,
    /// Redirect to the verification page
    ChallengeRequired,
    /// The proxy provider refused the request
    ProxyThrottled,
    /// Anything else
    SystemError { needs_refresh: bool },
}

/// Applies a [`RuleSet`] to responses.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: RuleSet,
}

impl Classifier {
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Classify a list endpoint response.
    ///
    /// Checked in order: status and empty body, HTML pages, stale-session
    /// sentinels, empty answers.
    #[must_use]
    pub fn classify(&self, status: u16, body: &str, title: &str) -> Classification {
        if !(200..300).contains(&status) || body.trim().is_empty() {
            return Classification::RateLimited;
        }

        if self.is_html(body) {
            if self.is_challenge(title, body) {
                return Classification::ChallengeRequired;
            }
            return Classification::SystemError {
                needs_refresh: self.needs_refresh(body),
            };
        }

        let trimmed = body.trim();
        if self
            .rules
            .stale_sentinels
            .iter()
            .any(|s| s.eq_ignore_ascii_case(trimmed))
        {
            return Classification::StaleSession;
        }

        if self.rules.empty_bodies.iter().any(|s| s == trimmed) {
            return Classification::Empty;
        }

        Classification::Valid(body.to_string())
    }

    /// Classify the current source of a content page.
    #[must_use]
    pub fn classify_page(&self, title: &str, source: &str) -> PageClass {
        if source.is_empty() {
            return PageClass::Pending;
        }
        if source.contains(&self.rules.content_marker) {
            return PageClass::Content;
        }
        if source.contains(&self.rules.verify_redirect_marker) {
            return PageClass::ChallengeRequired;
        }
        if source.contains(&self.rules.proxy_throttle_marker) {
            return PageClass::ProxyThrottled;
        }
        PageClass::SystemError {
            needs_refresh: self.is_challenge(title, source) || self.needs_refresh(source),
        }
    }

    /// Human-readable refresh reason for an error page, if it calls for one.
    #[must_use]
    pub fn refresh_reason(&self, title: &str, body: &str) -> Option<&'static str> {
        if self.is_challenge(title, body) {
            Some("page need verification")
        } else if self.needs_refresh(body) {
            Some("page javascript error, need refresh")
        } else {
            None
        }
    }

    fn is_html(&self, body: &str) -> bool {
        self.rules
            .html_prefixes
            .iter()
            .any(|p| body.starts_with(p.as_str()))
    }

    fn is_challenge(&self, title: &str, body: &str) -> bool {
        self.rules
            .challenge_title_markers
            .iter()
            .any(|m| title.contains(m.as_str()))
            || self
                .rules
                .challenge_markers
                .iter()
                .any(|m| body.contains(m.as_str()))
    }

    fn needs_refresh(&self, body: &str) -> bool {
        self.rules
            .refresh_markers
            .iter()
            .any(|m| body.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(status: u16, body: &str) -> Classification {
        Classifier::default().classify(status, body, "")
    }

    #[test]
    fn test_failed_status_is_rate_limited() {
        for status in [429, 502, 503] {
            assert_eq!(classify(status, "\"remind key\""), Classification::RateLimited);
            assert_eq!(
                classify(status, "<html>访问验证</html>"),
                Classification::RateLimited
            );
        }
    }

    #[test]
    fn test_empty_body_is_rate_limited() {
        assert_eq!(classify(200, ""), Classification::RateLimited);
        assert_eq!(classify(200, "  \n"), Classification::RateLimited);
    }

    #[test]
    fn test_sentinels_are_stale_session() {
        assert_eq!(classify(200, "\"remind\""), Classification::StaleSession);
        assert_eq!(classify(200, "\"remind key\""), Classification::StaleSession);
        assert_eq!(classify(200, "\"REMIND KEY\""), Classification::StaleSession);
        assert_ne!(classify(200, "remind"), Classification::StaleSession);
    }

    #[test]
    fn test_challenge_pages() {
        let body = "<!DOCTYPE html><script>window.location.href='/Html_Pages/VisitRemind20180914.html?x'</script>";
        assert_eq!(classify(200, body), Classification::ChallengeRequired);

        let by_title = Classifier::default().classify(200, "<html><body></body></html>", "访问验证");
        assert_eq!(by_title, Classification::ChallengeRequired);
    }

    #[test]
    fn test_other_html_pages() {
        assert_eq!(
            classify(200, "<html><body>请开启JavaScript并刷新该页</body></html>"),
            Classification::SystemError {
                needs_refresh: true
            }
        );
        assert_eq!(
            classify(200, "<html><body>maintenance</body></html>"),
            Classification::SystemError {
                needs_refresh: false
            }
        );
    }

    #[test]
    fn test_payloads() {
        assert_eq!(classify(200, "[]"), Classification::Empty);
        let payload = "\"[{\\\"RunEval\\\":\\\"w61a\\\",\\\"Count\\\":\\\"12\\\"}]\"";
        assert_eq!(
            classify(200, payload),
            Classification::Valid(payload.to_string())
        );
    }

    #[test]
    fn test_content_pages() {
        let classifier = Classifier::default();
        assert_eq!(classifier.classify_page("", ""), PageClass::Pending);
        assert_eq!(
            classifier.classify_page("", "<html><head></head><body>$(function(){$(\"#con_llcs\").html(x)})</body></html>"),
            PageClass::Content
        );
        assert_eq!(
            classifier.classify_page("", "<script>window.location.href='/Html_Pages/VisitRemind20180914.html'</script>"),
            PageClass::ChallengeRequired
        );
        assert_eq!(
            classifier.classify_page("", "<a href=\"https://www.abuyun.com/\">abuyun</a>"),
            PageClass::ProxyThrottled
        );
        assert_eq!(
            classifier.classify_page("访问验证", "<html></html>"),
            PageClass::SystemError {
                needs_refresh: true
            }
        );
    }

    #[test]
    fn test_refresh_reason() {
        let classifier = Classifier::default();
        assert!(classifier.refresh_reason("", "<html>ok</html>").is_none());
        assert_eq!(
            classifier.refresh_reason("", "请开启JavaScript并刷新该页"),
            Some("page javascript error, need refresh")
        );
    }
}
