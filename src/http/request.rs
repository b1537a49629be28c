//! Inbound request preparation.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID for every request that lacks one
//! - Buffer the caller body up to the configured limit
//! - Hand the pipeline an immutable `ProxyRequest`

use axum::{
    body::{to_bytes, Body},
    http::{HeaderValue, Request},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::ProxyError;
use crate::proxy::ProxyRequest;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID generator for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Buffer `request` into a `ProxyRequest`. Bodies over `max_body_size`
/// are rejected with `PayloadTooLarge`.
pub async fn into_proxy_request(
    request: Request<Body>,
    max_body_size: usize,
) -> Result<ProxyRequest, ProxyError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, max_body_size)
        .await
        .map_err(|_| ProxyError::PayloadTooLarge(max_body_size))?;

    Ok(ProxyRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    })
}
