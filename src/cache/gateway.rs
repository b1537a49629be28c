//! Cache gateway: the only way the pipeline talks to a cache store.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::CACHE_CONTROL, HeaderValue, Method, StatusCode};
use tokio::task::JoinHandle;

use super::{CacheStore, MemoryCacheStore};
use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::proxy::ProxyResponse;
use crate::target::TargetUrl;

/// Result of a cache lookup. Store failures surface as `Miss`.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(ProxyResponse),
    Miss,
}

#[derive(Clone)]
pub struct CacheGateway {
    store: Option<Arc<dyn CacheStore>>,
    freshness: HeaderValue,
    max_body_bytes: usize,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, max_body_bytes: usize) -> Self {
        let freshness = HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs()))
            .unwrap_or_else(|_| HeaderValue::from_static("public, max-age=60"));
        Self {
            store: Some(store),
            freshness,
            max_body_bytes,
        }
    }

    /// Gateway over an in-process store, or a disabled one.
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let ttl = Duration::from_secs(config.ttl_secs);
        let store = Arc::new(MemoryCacheStore::new(config.max_entries, ttl));
        Self::new(store, ttl, config.max_body_bytes)
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            freshness: HeaderValue::from_static("no-store"),
            max_body_bytes: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Only GET lookups are served from the cache.
    pub fn applies_to(&self, method: &Method) -> bool {
        self.is_enabled() && *method == Method::GET
    }

    /// Only successful GETs are stored.
    pub fn should_store(&self, method: &Method, status: StatusCode) -> bool {
        self.applies_to(method) && status == StatusCode::OK
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub async fn lookup(&self, key: &TargetUrl) -> CacheLookup {
        let Some(store) = &self.store else {
            return CacheLookup::Miss;
        };

        match store.get(key.as_str()).await {
            Ok(Some(response)) => {
                metrics::record_cache_event("hit");
                CacheLookup::Hit(response)
            }
            Ok(None) => {
                metrics::record_cache_event("miss");
                CacheLookup::Miss
            }
            Err(e) => {
                tracing::debug!(target_url = %key, error = %e, "Cache lookup failed, treating as miss");
                metrics::record_cache_event("error");
                CacheLookup::Miss
            }
        }
    }

    /// Store a snapshot in the background with the freshness directive attached.
    ///
    /// Returns the spawned task so tests can wait for it; the pipeline drops it.
    pub fn store(&self, key: &TargetUrl, mut response: ProxyResponse) -> Option<JoinHandle<()>> {
        let store = self.store.clone()?;
        if response.body.len() > self.max_body_bytes {
            tracing::debug!(target_url = %key, size = response.body.len(), "Response too large to cache");
            return None;
        }

        response.headers.insert(CACHE_CONTROL, self.freshness.clone());
        let key = key.as_str().to_string();

        Some(tokio::spawn(async move {
            match store.put(&key, response).await {
                Ok(()) => metrics::record_cache_event("store"),
                Err(e) => {
                    tracing::debug!(target_url = %key, error = %e, "Cache store failed");
                    metrics::record_cache_event("error");
                }
            }
        }))
    }
}
