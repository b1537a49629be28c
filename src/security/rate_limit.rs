//! Fixed-window per-client rate limiting.
//!
//! Best-effort only: each process instance keeps its own counters, so the
//! limit is not globally consistent across instances. This is not a security
//! boundary.

use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Header set by the edge with the connecting client address.
pub const CONNECTING_IP_HEADER: &str = "cf-connecting-ip";

/// Bucket shared by every client that cannot be identified.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

/// Per-client request counter for the current window.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub count: u32,
    pub started: Instant,
}

/// Fixed-window rate limiter keyed by client identifier.
///
/// Constructed once at startup and shared by handle. The reset check and the
/// increment for one client run under that client's map shard lock.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    window: Duration,
    max_requests: u32,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
            enabled: true,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(Duration::from_millis(config.window_ms), config.max_requests)
        }
    }

    pub fn admit(&self, client_id: &str) -> Admission {
        self.admit_at(client_id, Instant::now())
    }

    /// Count one request for `client_id` observed at `now`.
    pub fn admit_at(&self, client_id: &str, now: Instant) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }

        let mut entry = self
            .windows
            .entry(client_id.to_string())
            .or_insert(RateWindow { count: 0, started: now });
        let window = entry.value_mut();

        if now.saturating_duration_since(window.started) > self.window {
            window.count = 0;
            window.started = now;
        }
        window.count = window.count.saturating_add(1);

        if window.count > self.max_requests {
            metrics::record_rate_limited();
            Admission::Denied
        } else {
            Admission::Allowed
        }
    }

    /// Current window for a client, if one is tracked.
    pub fn window_for(&self, client_id: &str) -> Option<RateWindow> {
        self.windows.get(client_id).map(|w| *w.value())
    }

    /// Drop windows that expired before `now`.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) <= self.window);
        before - self.windows.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Periodically prune expired windows until shutdown.
    pub async fn run_sweeper(
        self: std::sync::Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        if !self.enabled {
            return;
        }

        let mut ticker = time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.prune(Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.tracked_clients(), "Pruned rate limit windows");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limit sweeper stopping");
                    break;
                }
            }
        }
    }
}

/// Derive the client identifier from request headers.
///
/// Connecting-IP header first, then the first forwarded-for hop, then the
/// shared `unknown` bucket.
pub fn client_id(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header(CONNECTING_IP_HEADER) {
        return ip.to_string();
    }
    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    UNKNOWN_CLIENT.to_string()
}
