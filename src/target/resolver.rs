//! Normalization and validation of target URLs.

use std::borrow::Cow;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

/// Path prefix that every rewritten reference is routed through.
pub const PROXY_PREFIX: &str = "/proxy/";

/// Prefix of the query/path form of the proxy endpoint.
const API_PROXY_PREFIX: &str = "/api/proxy";

/// Encoded `://`, the marker of a target that arrived fully percent-encoded.
const ENCODED_SCHEME_SEPARATOR: &str = "%3a%2f%2f";

/// Component encoding used for proxied paths. Close to `encodeURIComponent`,
/// but `'` is escaped too so the value is safe inside single-quoted attributes.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'(')
    .remove(b')');

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No target URL provided. Use /proxy/<url> or /api/proxy?url=<encoded-url>")]
    Missing,

    #[error("Invalid URL format: {0}")]
    Invalid(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// A validated absolute http(s) URL with a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetUrl(Url);

impl TargetUrl {
    fn from_url(url: Url) -> Result<Self, ResolveError> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ResolveError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ResolveError::Invalid(format!("missing host in {}", url)));
        }
        Ok(Self(url))
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// `scheme://host[:port]` of the target.
    pub fn origin(&self) -> String {
        self.0.origin().ascii_serialization()
    }

    /// Path under which this URL is reachable through the proxy.
    pub fn proxied(&self) -> String {
        proxied_path(&self.0)
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl TryFrom<Url> for TargetUrl {
    type Error = ResolveError;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        Self::from_url(url)
    }
}

/// Resolve a caller-supplied target string into a validated URL.
///
/// A value that is still percent-encoded as a whole URL is decoded exactly
/// once; a value without a scheme gets `https://` prepended.
pub fn resolve(raw: &str) -> Result<TargetUrl, ResolveError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::Missing);
    }

    let decoded: Cow<'_, str> = if looks_fully_encoded(trimmed) {
        percent_decode_str(trimmed).decode_utf8_lossy()
    } else {
        Cow::Borrowed(trimmed)
    };

    let candidate = if has_http_scheme(&decoded) {
        decoded.into_owned()
    } else {
        format!("https://{}", decoded)
    };

    let url = Url::parse(&candidate).map_err(|e| ResolveError::Invalid(e.to_string()))?;
    TargetUrl::from_url(url)
}

/// Resolve a target whose inbound query string arrived separately.
///
/// Only `raw` goes through [`resolve`]; `query` is appended as-is, so encoded
/// form values (`%26`, `%2B`, `%23`) reach the origin unchanged.
pub fn resolve_with_query(raw: &str, query: Option<&str>) -> Result<TargetUrl, ResolveError> {
    let mut target = resolve(raw)?;
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        let combined = match target.0.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
            _ => query.to_string(),
        };
        target.0.set_query(Some(&combined));
    }
    Ok(target)
}

/// Resolve a reference found inside a fetched document against its base.
///
/// Returns `None` when the reference cannot be resolved or does not resolve
/// to an http(s) URL; callers leave the original text untouched.
pub fn resolve_relative(reference: &str, base: &TargetUrl) -> Option<TargetUrl> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    base.0
        .join(reference)
        .ok()
        .and_then(|url| TargetUrl::from_url(url).ok())
}

/// Proxy path encoding the absolute URL as a single path component.
pub fn proxied_path(url: &Url) -> String {
    format!("{}{}", PROXY_PREFIX, utf8_percent_encode(url.as_str(), COMPONENT))
}

/// True for references that already route through this proxy.
pub fn is_proxied_reference(reference: &str) -> bool {
    let reference = reference.trim_start();
    reference.starts_with(PROXY_PREFIX) || reference.starts_with(API_PROXY_PREFIX)
}

fn looks_fully_encoded(value: &str) -> bool {
    value.to_ascii_lowercase().contains(ENCODED_SCHEME_SEPARATOR)
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
