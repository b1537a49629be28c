//! Content rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! Origin content-type
//!     → ContentKind::from_content_type (once per response)
//!     → Html → html.rs (attributes, then script/link sources)
//!     → Css  → css.rs  (url(...) functions)
//!     → JavaScript → js.rs (navigation assignments)
//!     → Opaque → bytes passed through untouched
//! ```
//!
//! # Design Decisions
//! - Pure text-to-text transforms: no I/O, never fail the request
//! - A reference that cannot be resolved is left verbatim
//! - Regex scanning over a fixed attribute/function list; this is not an
//!   HTML, CSS or JavaScript parser

pub mod css;
pub mod html;
pub mod js;

use bytes::Bytes;

use crate::observability::metrics;
use crate::target::TargetUrl;

/// Rewriter selected from a response content-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    JavaScript,
    Opaque,
}

impl ContentKind {
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => ContentKind::Html,
            "text/css" => ContentKind::Css,
            m if m.contains("javascript") || m.contains("ecmascript") => ContentKind::JavaScript,
            _ => ContentKind::Opaque,
        }
    }

    pub fn is_rewritable(self) -> bool {
        !matches!(self, ContentKind::Opaque)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Css => "css",
            ContentKind::JavaScript => "javascript",
            ContentKind::Opaque => "opaque",
        }
    }

    /// Rewrite a text body against `base`.
    pub fn rewrite_text(self, text: &str, base: &TargetUrl) -> String {
        match self {
            ContentKind::Html => html::rewrite_html(text, base),
            ContentKind::Css => css::rewrite_css(text, base),
            ContentKind::JavaScript => js::rewrite_js(text),
            ContentKind::Opaque => text.to_string(),
        }
    }

    /// Decode, rewrite and re-encode a body. Opaque bodies are returned as is.
    pub fn rewrite_body(self, body: Bytes, base: &TargetUrl) -> Bytes {
        if !self.is_rewritable() {
            return body;
        }
        let text = String::from_utf8_lossy(&body);
        let rewritten = self.rewrite_text(&text, base);
        metrics::record_rewrite(self.as_str());
        Bytes::from(rewritten)
    }
}
