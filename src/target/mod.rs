//! Target URL resolution subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (path, query)
//!     → extract.rs (pick exactly one source: ?url=, /api/proxy/<enc>, /proxy/<raw>)
//!     → resolver.rs (decode the target once if fully encoded, infer scheme,
//!       validate, append the inbound query verbatim)
//!     → TargetUrl (http/https, host present)
//!
//! Content rewriters:
//!     reference text + TargetUrl base
//!     → resolver.rs (resolve_relative)
//!     → proxied_path() for the rewritten attribute
//! ```
//!
//! # Design Decisions
//! - TargetUrl can only be built through the resolver; raw caller input is never trusted
//! - Relative resolution is best-effort and returns Option, never an error

pub mod extract;
pub mod resolver;

pub use extract::{extract_target, RawTarget};
pub use resolver::{
    is_proxied_reference, proxied_path, resolve, resolve_relative, resolve_with_query, ResolveError,
    TargetUrl, PROXY_PREFIX,
};
