//! Outbound fetch capability.
//!
//! The pipeline only sees the `Upstream` trait, so tests substitute an
//! in-process origin and production uses a pooled `reqwest` client.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::redirect::Policy;

use super::body::BodyStream;
use super::types::{OutboundBody, OutboundRequest, UpstreamResponse};
use crate::config::UpstreamConfig;
use crate::error::ProxyError;

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `request` and return once the origin's status and headers are known.
    async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError>;
}

/// `reqwest`-backed upstream with redirect following and transparent
/// decompression of gzip, deflate and brotli bodies.
#[derive(Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(Policy::limited(config.max_redirects))
            .no_proxy()
            .build()
            .map_err(|e| ProxyError::Upstream(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        builder = match request.body {
            OutboundBody::Empty => builder,
            OutboundBody::Text(text) => builder.body(text),
            OutboundBody::Binary(bytes) => builder.body(bytes),
        };

        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body: BodyStream = Box::pin(response.bytes_stream().map_err(ProxyError::from));

        Ok(UpstreamResponse {
            status,
            headers,
            url,
            body,
        })
    }
}
