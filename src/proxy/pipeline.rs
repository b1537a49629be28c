//! Request orchestrator.
//!
//! Runs one inbound proxy request through a strictly sequential pipeline:
//!
//! ```text
//! AUTH → ADMIT → RESOLVE → CACHE-LOOKUP ─┬─ hit ──────────────────────────────→ RESPOND
//!                                        └─ miss → DISPATCH → FETCH → TRANSFORM → CACHE-STORE → RESPOND
//! ```
//!
//! Any stage may short-circuit with a `ProxyError`, which is rendered as a
//! JSON error response. The only suspension points are the cache lookup and
//! the upstream fetch; cache stores are spawned and never awaited here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use super::body::{self, Buffered, TeeBody};
use super::types::{OutboundBody, OutboundRequest, ProxyRequest, ProxyResponse, UpstreamResponse};
use super::upstream::Upstream;
use crate::cache::{CacheGateway, CacheLookup};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::X_REQUEST_ID;
use crate::observability::metrics;
use crate::rewrite::ContentKind;
use crate::security::{client_id, sanitize_response_headers, Admission, ApiKeyAuth, HeaderPolicy, RateLimiter};
use crate::target::{extract_target, ResolveError, TargetUrl};

/// Shared, immutable proxy service. One instance serves every request.
pub struct ProxyService {
    auth: ApiKeyAuth,
    limiter: Arc<RateLimiter>,
    header_policy: HeaderPolicy,
    cache: CacheGateway,
    upstream: Arc<dyn Upstream>,
    request_timeout: Duration,
    max_rewrite_bytes: usize,
}

impl ProxyService {
    pub fn new(config: &ProxyConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            auth: ApiKeyAuth::new(config.auth.api_key.clone()),
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            header_policy: HeaderPolicy::new(&config.headers, &config.upstream),
            cache: CacheGateway::from_config(&config.cache),
            upstream,
            request_timeout: Duration::from_secs(config.upstream.request_timeout_secs),
            max_rewrite_bytes: config.upstream.max_rewrite_bytes,
        }
    }

    pub fn with_cache(mut self, cache: CacheGateway) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Limiter handle for the background window sweeper.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Run the pipeline and render failures, recording request metrics.
    pub async fn handle(&self, request: ProxyRequest) -> Response {
        let start = Instant::now();
        let method = request.method.clone();

        let response = match self.process(request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), start);
        response
    }

    pub async fn process(&self, request: ProxyRequest) -> Result<Response, ProxyError> {
        let request_id = request_id(&request.headers);

        // AUTH
        if !self.auth.check(&request.headers) {
            tracing::warn!(request_id = %request_id, "Rejected request without a valid API key");
            return Err(ProxyError::Unauthorized);
        }

        // ADMIT
        let client = client_id(&request.headers);
        if self.limiter.admit(&client) == Admission::Denied {
            tracing::warn!(request_id = %request_id, client = %client, "Rate limit exceeded");
            return Err(ProxyError::RateLimited);
        }

        // RESOLVE
        let target = resolve_target(&request.uri).inspect_err(|e| {
            tracing::warn!(request_id = %request_id, uri = %request.uri, error = %e, "Bad proxy target");
        })?;

        // CACHE-LOOKUP
        if self.cache.applies_to(&request.method) {
            if let CacheLookup::Hit(cached) = self.cache.lookup(&target).await {
                tracing::debug!(request_id = %request_id, target = %target, "Serving from cache");
                return Ok(cached.into_response());
            }
        }

        // DISPATCH
        let outbound = OutboundRequest {
            method: request.method.clone(),
            url: target.as_url().clone(),
            headers: self.header_policy.outbound_headers(&request.headers, &target),
            body: OutboundBody::for_request(&request.method, &request.headers, &request.body),
        };
        tracing::debug!(
            request_id = %request_id,
            client = %client,
            method = %request.method,
            target = %target,
            "Forwarding request"
        );

        // FETCH
        let upstream = match tokio::time::timeout(self.request_timeout, self.upstream.fetch(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, target = %target, error = %e, "Upstream request failed");
                metrics::record_upstream_error("fetch");
                return Err(e);
            }
            Err(_) => {
                tracing::error!(
                    request_id = %request_id,
                    target = %target,
                    timeout_secs = self.request_timeout.as_secs_f64(),
                    "Upstream request timed out"
                );
                metrics::record_upstream_error("timeout");
                return Err(ProxyError::UpstreamTimeout(self.request_timeout));
            }
        };

        // TRANSFORM + CACHE-STORE
        let cacheable = self.cache.should_store(&request.method, upstream.status);
        let response = self.transform(upstream, &target, cacheable).await.inspect_err(|e| {
            tracing::error!(request_id = %request_id, target = %target, error = %e, "Failed reading upstream body");
            metrics::record_upstream_error("body");
        })?;

        tracing::debug!(request_id = %request_id, target = %target, status = %response.status(), "Proxied");
        Ok(response)
    }

    async fn transform(
        &self,
        upstream: UpstreamResponse,
        target: &TargetUrl,
        cacheable: bool,
    ) -> Result<Response, ProxyError> {
        let kind = ContentKind::from_content_type(upstream.content_type());
        let status = upstream.status;
        let headers = sanitize_response_headers(&upstream.headers);

        let mut stream = upstream.body;
        let mut cacheable = cacheable;
        if kind.is_rewritable() {
            match body::collect_limited(stream, self.max_rewrite_bytes).await? {
                Buffered::Complete(raw) => {
                    // Redirects move the document; relative references follow the final URL.
                    let base = TargetUrl::try_from(upstream.url).unwrap_or_else(|_| target.clone());
                    let snapshot = ProxyResponse {
                        status,
                        headers,
                        body: kind.rewrite_body(raw, &base),
                    };
                    if cacheable {
                        self.cache.store(target, snapshot.clone());
                    }
                    return Ok(snapshot.into_response());
                }
                Buffered::Overflow(rest) => {
                    tracing::warn!(
                        target = %target,
                        limit = self.max_rewrite_bytes,
                        "Body too large to rewrite, passing it through unmodified"
                    );
                    stream = rest;
                    cacheable = false;
                }
            }
        }

        let body = if cacheable {
            let cache = self.cache.clone();
            let key = target.clone();
            let cached_headers = headers.clone();
            let tee = TeeBody::new(
                stream,
                self.cache.max_body_bytes(),
                Box::new(move |body: Bytes| {
                    cache.store(
                        &key,
                        ProxyResponse {
                            status,
                            headers: cached_headers,
                            body,
                        },
                    );
                }),
            );
            Body::from_stream(tee)
        } else {
            Body::from_stream(stream)
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn resolve_target(uri: &Uri) -> Result<TargetUrl, ProxyError> {
    let raw = extract_target(uri.path(), uri.query()).ok_or(ResolveError::Missing)?;
    Ok(raw.resolve()?)
}

fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::proxy::body::from_bytes;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::{header, HeaderValue, Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use url::Url;

    /// In-process origin that counts fetches and remembers the last request.
    struct MockUpstream {
        calls: AtomicUsize,
        last: Mutex<Option<OutboundRequest>>,
        status: StatusCode,
        content_type: &'static str,
        body: &'static str,
        final_url: Option<&'static str>,
        delay: Option<Duration>,
        fail: bool,
    }

    impl MockUpstream {
        fn new(content_type: &'static str, body: &'static str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
                status: StatusCode::OK,
                content_type,
                body,
                final_url: None,
                delay: None,
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Upstream for MockUpstream {
        async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ProxyError::Upstream("connection refused".into()));
            }

            let url = match self.final_url {
                Some(url) => Url::parse(url).unwrap(),
                None => request.url.clone(),
            };
            *self.last.lock().unwrap() = Some(request);

            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
            headers.insert(header::SET_COOKIE, HeaderValue::from_static("sid=1"));
            headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
            headers.insert(header::SERVER, HeaderValue::from_static("nginx"));
            headers.insert(header::ETAG, HeaderValue::from_static("\"v1\""));

            Ok(UpstreamResponse {
                status: self.status,
                headers,
                url,
                body: from_bytes(Bytes::from_static(self.body.as_bytes())),
            })
        }
    }

    fn service(config: &ProxyConfig, upstream: &Arc<MockUpstream>) -> ProxyService {
        ProxyService::new(config, Arc::clone(upstream) as Arc<dyn Upstream>)
    }

    fn request(method: Method, uri: &str) -> ProxyRequest {
        ProxyRequest {
            method,
            uri: uri.parse().unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_html_is_rewritten_and_headers_sanitized() {
        let upstream = Arc::new(MockUpstream::new("text/html; charset=utf-8", r#"<a href="/foo">x</a>"#));
        let svc = service(&ProxyConfig::default(), &upstream);

        let response = svc.handle(request(Method::GET, "/proxy/https://example.com/bar/")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers().clone();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/html; charset=utf-8");
        assert_eq!(headers.get(header::ETAG).unwrap(), "\"v1\"");
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert!(headers.get("x-frame-options").is_none());
        assert!(headers.get(header::SERVER).is_none());

        let body = body_text(response).await;
        assert!(body.contains(r#"href="/proxy/https%3A%2F%2Fexample.com%2Ffoo""#));
        assert!(body.contains("openTab"));
    }

    #[tokio::test]
    async fn test_outbound_request_is_spoofed() {
        let upstream = Arc::new(MockUpstream::new("text/plain", "ok"));
        let svc = service(&ProxyConfig::default(), &upstream);

        let mut req = request(Method::GET, "/api/proxy?url=https%3A%2F%2Fexample.com%2Fpage");
        req.headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        req.headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        req.headers.insert(header::COOKIE, HeaderValue::from_static("secret=1"));
        let response = svc.handle(req).await;
        assert_eq!(response.status(), StatusCode::OK);

        let sent = upstream.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.url.as_str(), "https://example.com/page");
        assert_eq!(sent.body, OutboundBody::Empty);
        assert_eq!(sent.headers.get(header::ACCEPT).unwrap(), "text/html");
        assert_eq!(sent.headers.get(header::REFERER).unwrap(), "https://example.com/");
        assert!(sent.headers.get(header::USER_AGENT).is_some());
        assert!(sent.headers.get("x-forwarded-for").is_none());
        assert!(sent.headers.get(header::COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_redirected_document_uses_final_url_as_base() {
        let mut mock = MockUpstream::new("text/html", r#"<img src="logo.png">"#);
        mock.final_url = Some("https://www.example.org/home/");
        let upstream = Arc::new(mock);
        let svc = service(&ProxyConfig::default(), &upstream);

        let response = svc.handle(request(Method::GET, "/proxy/example.org")).await;
        let body = body_text(response).await;
        assert!(body.contains("/proxy/https%3A%2F%2Fwww.example.org%2Fhome%2Flogo.png"));
    }

    #[tokio::test]
    async fn test_api_key_gate() {
        let upstream = Arc::new(MockUpstream::new("text/plain", "ok"));
        let mut config = ProxyConfig::default();
        config.auth.api_key = Some("s3cret".into());
        let svc = service(&config, &upstream);

        let denied = svc.handle(request(Method::GET, "/proxy/https://example.com/")).await;
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(upstream.calls(), 0);

        let mut req = request(Method::GET, "/proxy/https://example.com/");
        req.headers.insert("x-api-key", HeaderValue::from_static("s3cret"));
        assert_eq!(svc.handle(req).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_short_circuits_before_fetch() {
        let upstream = Arc::new(MockUpstream::new("text/plain", "ok"));
        let mut config = ProxyConfig::default();
        config.rate_limit.max_requests = 2;
        config.cache.enabled = false;
        let svc = service(&config, &upstream);

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let mut req = request(Method::GET, "/proxy/https://example.com/");
            req.headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.7"));
            statuses.push(svc.handle(req).await.status());
        }
        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_target() {
        let upstream = Arc::new(MockUpstream::new("text/plain", "ok"));
        let svc = service(&ProxyConfig::default(), &upstream);

        let missing = svc.handle(request(Method::GET, "/proxy/")).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        let invalid = svc.handle(request(Method::GET, "/proxy/http://")).await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_repeat_get_is_served_from_cache() {
        let upstream = Arc::new(MockUpstream::new("text/html", "<p>hi</p>"));
        let svc = service(&ProxyConfig::default(), &upstream);

        let first = svc.handle(request(Method::GET, "/proxy/https://example.com/")).await;
        assert_eq!(body_text(first).await, "<p>hi</p>");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = svc.handle(request(Method::GET, "/proxy/https://example.com/")).await;
        assert_eq!(second.headers().get(header::CACHE_CONTROL).unwrap(), "public, max-age=60");
        assert_eq!(body_text(second).await, "<p>hi</p>");
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_streamed_opaque_body_is_cached_after_completion() {
        let upstream = Arc::new(MockUpstream::new("image/png", "PNGDATA"));
        let gateway = CacheGateway::new(
            Arc::new(MemoryCacheStore::new(16, Duration::from_secs(60))),
            Duration::from_secs(60),
            1024,
        );
        let svc = service(&ProxyConfig::default(), &upstream).with_cache(gateway);

        let first = svc.handle(request(Method::GET, "/proxy/https://example.com/a.png")).await;
        assert_eq!(body_text(first).await, "PNGDATA");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = svc.handle(request(Method::GET, "/proxy/https://example.com/a.png")).await;
        assert_eq!(body_text(second).await, "PNGDATA");
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_get_is_never_cached() {
        let upstream = Arc::new(MockUpstream::new("application/json", "{}"));
        let svc = service(&ProxyConfig::default(), &upstream);

        for _ in 0..2 {
            let mut req = request(Method::POST, "/proxy/https://example.com/api");
            req.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            req.body = Bytes::from_static(br#"{"q":1}"#);
            assert_eq!(svc.handle(req).await.status(), StatusCode::OK);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(upstream.calls(), 2);

        let sent = upstream.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.body, OutboundBody::Text(r#"{"q":1}"#.into()));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_json_500() {
        let mut mock = MockUpstream::new("text/plain", "");
        mock.fail = true;
        let upstream = Arc::new(mock);
        let svc = service(&ProxyConfig::default(), &upstream);

        let response = svc.handle(request(Method::GET, "/proxy/https://example.com/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "upstream_error");
        assert_eq!(body["message"], "connection refused");
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let mut mock = MockUpstream::new("text/plain", "late");
        mock.delay = Some(Duration::from_millis(500));
        let upstream = Arc::new(mock);
        let svc = service(&ProxyConfig::default(), &upstream)
            .with_request_timeout(Duration::from_millis(50));

        let result = svc.process(request(Method::GET, "/proxy/https://example.com/")).await;
        assert!(matches!(result, Err(ProxyError::UpstreamTimeout(_))));
    }

    #[tokio::test]
    async fn test_non_success_status_passes_through_uncached() {
        let mut mock = MockUpstream::new("text/plain", "gone");
        mock.status = StatusCode::NOT_FOUND;
        let upstream = Arc::new(mock);
        let svc = service(&ProxyConfig::default(), &upstream);

        for _ in 0..2 {
            let response = svc.handle(request(Method::GET, "/proxy/https://example.com/x")).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_text(response).await, "gone");
        }
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_oversized_document_streams_unmodified() {
        let html = r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>"#;
        let upstream = Arc::new(MockUpstream::new("text/html", html));
        let mut config = ProxyConfig::default();
        config.upstream.max_rewrite_bytes = 16;
        let svc = service(&config, &upstream);

        for _ in 0..2 {
            let response = svc.handle(request(Method::GET, "/proxy/https://example.com/big")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, html);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_encoded_target_keeps_encoded_query_values() {
        let upstream = Arc::new(MockUpstream::new("text/plain", "ok"));
        let svc = service(&ProxyConfig::default(), &upstream);

        let response = svc
            .handle(request(
                Method::GET,
                "/proxy/https%3A%2F%2Fexample.com%2Fsearch?q=c%2B%2B%26rust%23x",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let sent = upstream.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.url.path(), "/search");
        assert_eq!(sent.url.query(), Some("q=c%2B%2B%26rust%23x"));
    }
}
