//! Proxy core: the per-request pipeline and the outbound fetch.
//!
//! # Data Flow
//! ```text
//! ProxyRequest (from http::server)
//!     → pipeline.rs (auth, admission, target resolution, cache lookup)
//!     → upstream.rs (Upstream::fetch, bounded by the request timeout)
//!     → pipeline.rs (header sanitization, rewrite::ContentKind dispatch)
//!     → body.rs (buffer for rewriting, or stream through a cache tee)
//!     → axum Response
//! ```
//!
//! # Design Decisions
//! - Text content is buffered because rewriting needs the whole document
//! - Opaque content streams; a bounded copy feeds the cache when eligible
//! - The outbound client sits behind a trait so tests run without a network

pub mod body;
pub mod pipeline;
pub mod types;
pub mod upstream;

pub use pipeline::ProxyService;
pub use types::{OutboundBody, OutboundRequest, ProxyRequest, ProxyResponse, UpstreamResponse};
pub use upstream::{ReqwestUpstream, Upstream};
