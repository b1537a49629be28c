//! Error taxonomy for the proxy pipeline.
//!
//! Every variant renders as a well-formed JSON response
//! (`{"error": <kind>, "message": <string>}`) so no failure path can leave the
//! caller hanging or leak internal details.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::http::response::apply_cors;
use crate::target::ResolveError;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("API key missing or invalid")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("{0}")]
    BadRequest(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("{0}")]
    Upstream(String),

    #[error("Upstream did not respond within {}s", .0.as_secs())]
    UpstreamTimeout(Duration),

    #[error("Not found")]
    NotFound,
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Upstream(_) | ProxyError::UpstreamTimeout(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Value of the `error` field in the JSON body.
    pub fn error_kind(&self) -> &'static str {
        match self {
            ProxyError::Unauthorized => "unauthorized",
            ProxyError::RateLimited => "rate_limited",
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::PayloadTooLarge(_) => "payload_too_large",
            ProxyError::Upstream(_) | ProxyError::UpstreamTimeout(_) => "upstream_error",
            ProxyError::NotFound => "not_found",
        }
    }
}

impl From<ResolveError> for ProxyError {
    fn from(err: ResolveError) -> Self {
        ProxyError::BadRequest(err.to_string())
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProxyError::Upstream("Upstream request timed out".to_string());
        }
        ProxyError::Upstream(err.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.error_kind(),
            "message": self.to_string(),
        });

        let mut response = (status, Json(body)).into_response();
        apply_cors(response.headers_mut());
        response
    }
}
