//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, request ID, tracing, preflight, timeout)
//!     → request.rs (buffer body within the size limit → ProxyRequest)
//!     → proxy::pipeline (auth, admission, fetch, rewrite)
//!     → response.rs (CORS on every response, 204 preflights)
//!     → Send to client
//!
//! `/` and `/go/<target>` → ui.rs (static landing page)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod ui;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
