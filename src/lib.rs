//! Link-rewriting forward proxy library.
//!
//! Fetches an arbitrary http(s) URL on behalf of the caller, disguises the
//! request as an ordinary browser, sanitizes the response headers and rewrites
//! HTML, CSS and JavaScript so that every reference resolves back through the
//! proxy.

// Core pipeline
pub mod error;
pub mod proxy;
pub mod rewrite;
pub mod target;

// Supporting subsystems
pub mod cache;
pub mod config;
pub mod http;
pub mod security;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
