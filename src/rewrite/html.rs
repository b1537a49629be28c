//! HTML reference rewriting.
//!
//! Two passes over the document text:
//! 1. quoted `href`, `src`, `action` and `data-src` attributes in tag
//!    position; links and forms additionally get a click handler asking the
//!    host page to open the target in a new tab. Inline `<script>` bodies are
//!    skipped so property assignments like `link.href = "..."` stay valid.
//! 2. `<script>`/`<link>` sources the first pass missed (typically unquoted)
//!    that are not already absolute

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::target::{is_proxied_reference, resolve_relative, TargetUrl};

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?P<lead>\s)(?P<attr>href|src|action|data-src)\s*=\s*(?P<quote>["'])(?P<value>[^"']+)["']"#,
    )
    .expect("valid HTML attribute regex")
});

static SCRIPT_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?P<open><script\b[^>]*>)(?P<body>.*?)(?P<close></script\s*>)")
        .expect("valid script body regex")
});

static SCRIPT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?P<prefix><(?:script|link)\b[^>]*?\b(?:src|href)\s*=\s*)(?P<quote>["']?)(?P<value>[^"'\s>]+)["']?"#,
    )
    .expect("valid script/link regex")
});

/// Rewrite every resolvable reference in `html` to route through the proxy.
pub fn rewrite_html(html: &str, base: &TargetUrl) -> String {
    let attributes = rewrite_attributes(html, base);
    SCRIPT_LINK_RE
        .replace_all(&attributes, |caps: &Captures| rewrite_script_source(caps, base))
        .into_owned()
}

/// First pass, applied to markup only; script bodies are copied verbatim.
fn rewrite_attributes(html: &str, base: &TargetUrl) -> String {
    let rewrite = |markup: &str| {
        ATTR_RE
            .replace_all(markup, |caps: &Captures| rewrite_attribute(caps, base))
            .into_owned()
    };

    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for caps in SCRIPT_BODY_RE.captures_iter(html) {
        let Some(script) = caps.get(0) else { continue };
        out.push_str(&rewrite(&html[last..script.start()]));
        out.push_str(&rewrite(&caps["open"]));
        out.push_str(&caps["body"]);
        out.push_str(&caps["close"]);
        last = script.end();
    }
    out.push_str(&rewrite(&html[last..]));
    out
}

fn rewrite_attribute(caps: &Captures, base: &TargetUrl) -> String {
    let lead = &caps["lead"];
    let attr = &caps["attr"];
    let quote = &caps["quote"];

    let Some(proxied) = proxied_reference(&caps["value"], base) else {
        return caps[0].to_string();
    };

    if attr.eq_ignore_ascii_case("href") || attr.eq_ignore_ascii_case("action") {
        format!(
            r#"{lead}{attr}={quote}{proxied}{quote} onclick="window.top.postMessage({{type:'openTab',url:'{proxied}'}}, '*'); return false;""#
        )
    } else {
        format!("{lead}{attr}={quote}{proxied}{quote}")
    }
}

fn rewrite_script_source(caps: &Captures, base: &TargetUrl) -> String {
    let value = &caps["value"];
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http") || value.starts_with("//") {
        return caps[0].to_string();
    }

    match proxied_reference(value, base) {
        Some(proxied) => {
            let quote = match &caps["quote"] {
                "" => "\"",
                q => q,
            };
            format!("{}{quote}{proxied}{quote}", &caps["prefix"])
        }
        None => caps[0].to_string(),
    }
}

/// Proxied form of an attribute value, or `None` to leave it verbatim.
fn proxied_reference(value: &str, base: &TargetUrl) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') || is_proxied_reference(value) {
        return None;
    }
    let unescaped = value.replace("&amp;", "&");
    resolve_relative(&unescaped, base).map(|target| target.proxied())
}
