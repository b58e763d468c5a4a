//! Scope patterns — path-prefix matchers attached to access grants.
//!
//! A grant can narrow access under a domain to a URL path prefix. Patterns
//! come back from the reasoning provider as strings like `/r/esp32/*`:
//! a literal prefix followed by a trailing wildcard. An empty pattern,
//! a bare `*`, or `/*` means "every path under the domain".
//!
//! Matching happens against the path+query of a navigation, both on the
//! server (recorded with the grant) and on each device agent (the part of
//! enforcement DNS cannot do).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A path-prefix matcher for URLs under a granted domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopePattern {
    /// None means unrestricted — every path matches.
    pattern: Option<String>,
}

impl ScopePattern {
    /// A pattern that matches every path under the domain.
    pub fn unrestricted() -> Self {
        Self { pattern: None }
    }

    /// Parse a raw pattern string from config or a provider verdict.
    /// Empty, `*`, and `/*` all normalize to unrestricted.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Self::unrestricted(),
            Some(s) => {
                let s = s.trim();
                if s.is_empty() || s == "*" || s == "/*" {
                    Self::unrestricted()
                } else {
                    Self {
                        pattern: Some(s.to_string()),
                    }
                }
            }
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.pattern.is_none()
    }

    /// The raw pattern string, or None when unrestricted.
    pub fn as_str(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Check whether a navigation's path+query falls inside this scope.
    ///
    /// The trailing wildcard is stripped and the remainder is treated as a
    /// literal prefix. The bare prefix without its trailing slash also
    /// matches, so `/r/esp32/*` accepts `/r/esp32` itself.
    pub fn matches(&self, path_and_query: &str) -> bool {
        let pattern = match &self.pattern {
            None => return true,
            Some(p) => p,
        };

        let prefix = pattern.trim_end_matches('*');
        if path_and_query.starts_with(prefix) {
            return true;
        }
        // Accept "/r/esp32" for pattern "/r/esp32/*"
        prefix.trim_end_matches('/') == path_and_query
    }
}

impl fmt::Display for ScopePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pattern {
            None => write!(f, "/*"),
            Some(p) => write!(f, "{}", p),
        }
    }
}

/// Split a URL into (host, path+query), dropping scheme and port.
/// Returns None when no host can be found.
pub fn split_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    let host = authority.split(':').next()?.trim();
    if host.is_empty() || !host.contains('.') && host != "localhost" {
        return None;
    }

    // Keep the query, drop the fragment
    let path = path.split('#').next().unwrap_or("/");
    Some((host.to_ascii_lowercase(), path.to_string()))
}

/// Extract just the host from a URL.
pub fn extract_domain(url: &str) -> Option<String> {
    split_url(url).map(|(host, _)| host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_pattern_matching() {
        let scope = ScopePattern::parse(Some("/r/esp32/*"));
        assert!(scope.matches("/r/esp32/"));
        assert!(scope.matches("/r/esp32/thread-1"));
        assert!(scope.matches("/r/esp32"));
        assert!(!scope.matches("/r/memes/1"));
        assert!(!scope.matches("/"));
    }

    #[test]
    fn test_unrestricted_patterns() {
        for raw in [None, Some(""), Some("*"), Some("/*"), Some("  ")] {
            let scope = ScopePattern::parse(raw);
            assert!(scope.is_unrestricted(), "{:?} should be unrestricted", raw);
            assert!(scope.matches("/"));
            assert!(scope.matches("/anything/at/all?q=1"));
        }
    }

    #[test]
    fn test_query_string_is_part_of_the_match_target() {
        let scope = ScopePattern::parse(Some("/search?q=rust*"));
        assert!(scope.matches("/search?q=rust&page=2"));
        assert!(!scope.matches("/search?q=cats"));
    }

    #[test]
    fn test_display_round_trips() {
        assert_eq!(ScopePattern::unrestricted().to_string(), "/*");
        assert_eq!(
            ScopePattern::parse(Some("/r/esp32/*")).to_string(),
            "/r/esp32/*"
        );
    }

    #[test]
    fn test_split_url() {
        assert_eq!(
            split_url("https://site.example/a/b?x=1"),
            Some(("site.example".to_string(), "/a/b?x=1".to_string()))
        );
        assert_eq!(
            split_url("http://reddit.com:8080"),
            Some(("reddit.com".to_string(), "/".to_string()))
        );
        assert_eq!(
            split_url("https://Site.Example/a#frag"),
            Some(("site.example".to_string(), "/a".to_string()))
        );
        assert_eq!(split_url("not-a-url"), None);
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.reddit.com/r/esp32/"),
            Some("www.reddit.com".to_string())
        );
        assert_eq!(extract_domain("http://localhost:3000/api"), Some("localhost".to_string()));
    }

    #[test]
    fn test_serde_transparent() {
        let scope: ScopePattern = serde_json::from_str("\"/a/*\"").unwrap();
        assert_eq!(scope.as_str(), Some("/a/*"));
        let json = serde_json::to_string(&ScopePattern::unrestricted()).unwrap();
        assert_eq!(json, "null");
    }
}
