//! Locating the raw target string inside an inbound request.
//!
//! Exactly one source is honored per request:
//! - `/api/proxy?url=<encoded>` (the explicit parameter wins on that endpoint)
//! - `/api/proxy/<encoded>` (decoded once)
//! - `/proxy/<url-or-encoded-url>` (raw path suffix; the inbound query string
//!   belongs to the target and is carried over verbatim)

use percent_encoding::percent_decode_str;
use url::form_urlencoded;

use super::resolver::{resolve_with_query, ResolveError, TargetUrl, PROXY_PREFIX};

const API_PROXY_PATH: &str = "/api/proxy";

/// Target as it appeared in the request, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTarget {
    /// URL text, possibly still percent-encoded as a whole.
    pub target: String,
    /// Inbound query string to append untouched after the target is decoded.
    pub query: Option<String>,
}

impl RawTarget {
    fn bare(target: String) -> Self {
        Self {
            target,
            query: None,
        }
    }

    pub fn resolve(&self) -> Result<TargetUrl, ResolveError> {
        resolve_with_query(&self.target, self.query.as_deref())
    }
}

/// Extract the raw target from a request path and query.
///
/// Returns `None` when the request names no target at all.
pub fn extract_target(path: &str, query: Option<&str>) -> Option<RawTarget> {
    if let Some(rest) = path.strip_prefix(API_PROXY_PATH) {
        if rest.is_empty() || rest.starts_with('/') {
            if let Some(param) = query.and_then(url_param) {
                return Some(RawTarget::bare(param));
            }
            let suffix = rest.trim_start_matches('/');
            return non_empty(percent_decode_str(suffix).decode_utf8_lossy().into_owned())
                .map(RawTarget::bare);
        }
        return None;
    }

    let suffix = match path.strip_prefix(PROXY_PREFIX) {
        Some(rest) => rest,
        None if path == "/proxy" => "",
        None => return None,
    };
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        return None;
    }

    Some(RawTarget {
        target: suffix.to_string(),
        query: query.filter(|q| !q.is_empty()).map(str::to_string),
    })
}

fn url_param(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(target: &str) -> Option<RawTarget> {
        Some(RawTarget::bare(target.to_string()))
    }

    #[test]
    fn test_query_parameter_wins_on_api_endpoint() {
        let target = extract_target(
            "/api/proxy/https%3A%2F%2Fignored.example",
            Some("url=https%3A%2F%2Fexample.com%2Fa%3Fb%3Dc"),
        );
        assert_eq!(target, bare("https://example.com/a?b=c"));
    }

    #[test]
    fn test_api_path_suffix_is_decoded() {
        let target = extract_target("/api/proxy/https%3A%2F%2Fexample.com%2Fx", None);
        assert_eq!(target, bare("https://example.com/x"));
    }

    #[test]
    fn test_proxy_path_keeps_raw_suffix_and_query() {
        let target = extract_target("/proxy/example.com/search", Some("q=rust&page=2")).unwrap();
        assert_eq!(target.target, "example.com/search");
        assert_eq!(target.query.as_deref(), Some("q=rust&page=2"));
        assert_eq!(target.resolve().unwrap().as_str(), "https://example.com/search?q=rust&page=2");

        let encoded = extract_target("/proxy/https%3A%2F%2Fexample.com%2F", Some(""));
        assert_eq!(encoded, bare("https%3A%2F%2Fexample.com%2F"));
    }

    #[test]
    fn test_encoded_form_values_survive_on_encoded_target() {
        let target = extract_target(
            "/proxy/https%3A%2F%2Fexample.com%2Fsearch",
            Some("q=c%2B%2B%26rust%23x&lang=en"),
        )
        .unwrap()
        .resolve()
        .unwrap();

        assert_eq!(target.as_url().path(), "/search");
        assert_eq!(target.as_url().query(), Some("q=c%2B%2B%26rust%23x&lang=en"));
        assert_eq!(target.as_url().fragment(), None);
    }

    #[test]
    fn test_proxy_path_ignores_url_parameter() {
        let target = extract_target("/proxy/example.com/redirect", Some("url=/next")).unwrap();
        assert_eq!(target.resolve().unwrap().as_str(), "https://example.com/redirect?url=/next");
    }

    #[test]
    fn test_missing_target() {
        assert_eq!(extract_target("/proxy/", None), None);
        assert_eq!(extract_target("/proxy", None), None);
        assert_eq!(extract_target("/api/proxy", None), None);
        assert_eq!(extract_target("/api/proxy", Some("url=")), None);
        assert_eq!(extract_target("/api/proxyfoo", Some("url=x")), None);
        assert_eq!(extract_target("/health", None), None);
    }
}
