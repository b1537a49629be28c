//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → Shutdown::trigger → server stops accepting and drains
//!                                → rate limit sweeper exits
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - One broadcast channel fans the shutdown out to every background task

pub mod shutdown;

pub use shutdown::Shutdown;
