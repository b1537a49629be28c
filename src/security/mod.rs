//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming proxy request:
//!     → auth.rs (optional x-api-key check)
//!     → rate_limit.rs (per-client fixed window)
//!     → headers.rs (allow-list + spoofing for the outbound request)
//!
//! Origin response:
//!     → headers.rs (allow-list, CORS, strip-list)
//! ```
//!
//! # Design Decisions
//! - Rate limiting is per process and best-effort, not a security boundary
//! - Header filtering defaults to drop in both directions

pub mod auth;
pub mod headers;
pub mod rate_limit;

pub use auth::ApiKeyAuth;
pub use headers::{sanitize_response_headers, HeaderPolicy};
pub use rate_limit::{client_id, Admission, RateLimiter};
