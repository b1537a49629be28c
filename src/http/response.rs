//! Response helpers shared by the handlers and the error renderer.
//!
//! Every response leaving the proxy, including errors and preflights,
//! carries the same permissive CORS header set.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS, HEAD, PATCH";
pub const CORS_MAX_AGE_SECS: &str = "86400";

/// Insert the CORS header set, replacing any existing values.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(CORS_MAX_AGE_SECS));
}

/// Answer to an `OPTIONS` preflight: 204, CORS headers, no body.
pub fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_cors(response.headers_mut());
    response
}
