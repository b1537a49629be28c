//! Structured logging.
//!
//! # Design Decisions
//! - `tracing` events with structured fields; `tower_http` spans per request
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directives for `level`: this crate and the HTTP layer at `level`,
/// everything else at `warn`.
pub fn default_directives(level: &str) -> String {
    format!("warn,stealth_proxy={level},proxy_cli={level},tower_http={level}")
}

/// Install the global subscriber. Safe to call once per process.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
