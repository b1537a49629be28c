//! Values flowing through the proxy pipeline.

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use url::Url;

use crate::proxy::body::BodyStream;

/// Inbound request, immutable once received.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Body sent to the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundBody {
    Empty,
    Text(String),
    Binary(Bytes),
}

impl OutboundBody {
    /// Pick the transfer form from the caller's content-type. GET and HEAD
    /// never carry a body.
    pub fn for_request(method: &Method, headers: &HeaderMap, body: &Bytes) -> Self {
        if *method == Method::GET || *method == Method::HEAD || body.is_empty() {
            return OutboundBody::Empty;
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let textual = content_type.contains("json")
            || content_type.starts_with("text/")
            || content_type.contains("x-www-form-urlencoded");

        if textual {
            if let Ok(text) = std::str::from_utf8(body) {
                return OutboundBody::Text(text.to_string());
            }
        }
        OutboundBody::Binary(body.clone())
    }
}

/// Request handed to the upstream fetcher.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

/// Origin response, consumed exactly once by the transform stage.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL after redirects; the base for rewriting.
    pub url: Url,
    pub body: BodyStream,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

/// Fully buffered response, as returned to the caller or held in the cache.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
