//! Header filters applied on the way out to the origin and on the way back.
//!
//! # Responsibilities
//! - Forward only an allow-list of caller headers (plus an optional prefix)
//! - Spoof a browser identity on the outbound request
//! - Delete tracking headers that reveal the caller or the edge
//! - Keep only an allow-list of origin response headers, add CORS, then
//!   strip embedding and framing headers again as a second pass
//!
//! # Design Decisions
//! - Both directions default to drop; nothing unknown is forwarded
//! - The response strip-list runs after CORS insertion so no earlier step can
//!   reintroduce a stripped header

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::{HeaderPolicyConfig, UpstreamConfig};
use crate::http::response::apply_cors;
use crate::target::TargetUrl;

/// Caller headers copied to the outbound request.
pub const REQUEST_ALLOW_LIST: &[&str] = &[
    "accept",
    "accept-language",
    "accept-encoding",
    "content-type",
    "cache-control",
    "pragma",
    "sec-fetch-dest",
    "sec-fetch-mode",
    "sec-fetch-site",
];

/// Headers that must never reach the origin.
pub const TRACKING_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-real-ip",
    "forwarded",
    "cf-connecting-ip",
    "cf-ray",
    "cf-ipcountry",
    "cf-visitor",
    "x-original-url",
    "x-api-key",
];

/// Origin headers copied to the caller.
pub const RESPONSE_ALLOW_LIST: &[&str] = &[
    "content-type",
    "cache-control",
    "expires",
    "etag",
    "last-modified",
];

/// Headers removed from every response, whatever added them.
pub const RESPONSE_STRIP_LIST: &[&str] = &[
    "set-cookie",
    "content-encoding",
    "content-length",
    "content-security-policy",
    "content-security-policy-report-only",
    "x-content-security-policy",
    "x-webkit-csp",
    "x-frame-options",
    "frame-options",
    "server",
    "x-powered-by",
    "x-aspnet-version",
];

const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Outbound header policy built once from configuration.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    passthrough_prefix: Option<String>,
    spoofed: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderPolicy {
    pub fn new(headers: &HeaderPolicyConfig, upstream: &UpstreamConfig) -> Self {
        let mut spoofed = Vec::new();
        let mut push = |name: HeaderName, value: &str| {
            if let Ok(value) = HeaderValue::from_str(value) {
                spoofed.push((name, value));
            } else {
                tracing::warn!(header = %name, "Ignoring invalid spoofed header value");
            }
        };
        push(header::USER_AGENT, &upstream.user_agent);
        push(header::ACCEPT_LANGUAGE, &upstream.accept_language);
        push(header::ACCEPT_ENCODING, DEFAULT_ACCEPT_ENCODING);
        push(header::CACHE_CONTROL, "no-cache");
        push(header::PRAGMA, "no-cache");

        Self {
            passthrough_prefix: headers
                .passthrough_prefix
                .as_ref()
                .map(|p| p.to_ascii_lowercase())
                .filter(|p| !p.is_empty()),
            spoofed,
        }
    }

    /// Build the header map for the request sent to `target`.
    pub fn outbound_headers(&self, inbound: &HeaderMap, target: &TargetUrl) -> HeaderMap {
        let mut out = HeaderMap::new();

        for (name, value) in inbound {
            if self.forwards(name) {
                out.append(name.clone(), value.clone());
            }
        }

        for (name, value) in &self.spoofed {
            out.insert(name.clone(), value.clone());
        }

        for name in TRACKING_HEADERS {
            out.remove(*name);
        }

        if !out.contains_key(header::REFERER) {
            if let Ok(referer) = HeaderValue::from_str(&format!("{}/", target.origin())) {
                out.insert(header::REFERER, referer);
            }
        }

        out
    }

    fn forwards(&self, name: &HeaderName) -> bool {
        let name = name.as_str();
        REQUEST_ALLOW_LIST.contains(&name)
            || self
                .passthrough_prefix
                .as_deref()
                .is_some_and(|prefix| name.starts_with(prefix))
    }
}

/// Sanitize origin response headers for the caller.
pub fn sanitize_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in upstream {
        if RESPONSE_ALLOW_LIST.contains(&name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }

    apply_cors(&mut out);
    strip_forbidden(&mut out);
    out
}

/// Second-pass removal of every header on the strip-list.
pub fn strip_forbidden(headers: &mut HeaderMap) {
    for name in RESPONSE_STRIP_LIST {
        headers.remove(*name);
    }
}
