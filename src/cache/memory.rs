//! In-process response store with TTL honoring.
//!
//! Stands in for the platform's edge cache: entries expire according to the
//! `max-age` directive they were stored with, and a full store refuses new
//! keys instead of evicting live ones.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::header::CACHE_CONTROL;
use dashmap::DashMap;

use super::{CacheError, CacheStore};
use crate::observability::metrics;
use crate::proxy::ProxyResponse;

struct Entry {
    response: ProxyResponse,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A thread-safe in-memory cache keyed by target URL.
pub struct MemoryCacheStore {
    entries: DashMap<String, Entry>,
    max_entries: usize,
    default_ttl: Duration,
}

impl MemoryCacheStore {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            default_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    fn ttl_for(&self, response: &ProxyResponse) -> Duration {
        response
            .headers
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(max_age)
            .unwrap_or(self.default_ttl)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<ProxyResponse>, CacheError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.response.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, response: ProxyResponse) -> Result<(), CacheError> {
        let ttl = self.ttl_for(&response);
        if ttl.is_zero() {
            return Ok(());
        }

        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                return Err(CacheError::Full(self.max_entries));
            }
        }

        self.entries.insert(
            key.to_string(),
            Entry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
        metrics::record_cache_size(self.entries.len());
        Ok(())
    }
}

/// Parse `max-age=N` out of a cache-control value.
fn max_age(value: &str) -> Option<Duration> {
    value.split(',').find_map(|directive| {
        let (name, secs) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            secs.trim().trim_matches('"').parse().ok().map(Duration::from_secs)
        } else {
            None
        }
    })
}
