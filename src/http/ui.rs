//! Landing page served on `/` and `/go/<target>`.
//!
//! The page itself is a static asset; the only server-side step is
//! embedding the initial target as a JavaScript string literal.

use axum::response::Html;
use percent_encoding::percent_decode_str;

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const INITIAL_PLACEHOLDER: &str = "__INITIAL_TARGET__";

/// Render the page with `initial` pre-filled. An empty value opens no tab.
pub fn landing_page(initial: &str) -> Html<String> {
    Html(INDEX_HTML.replace(INITIAL_PLACEHOLDER, &script_literal(initial)))
}

/// Decode the `/go/` path suffix once.
pub fn decode_initial(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// JSON string literal that cannot close the surrounding `<script>`.
fn script_literal(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/")
}
