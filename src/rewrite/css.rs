//! Stylesheet `url(...)` rewriting.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::target::{is_proxied_reference, resolve_relative, TargetUrl};

static URL_FN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)url\(([^)]+)\)").expect("valid css url() regex"));

pub fn rewrite_css(css: &str, base: &TargetUrl) -> String {
    URL_FN_RE
        .replace_all(css, |caps: &Captures| {
            let reference = caps[1].trim().trim_matches(|c| c == '"' || c == '\'').trim();
            if reference.is_empty()
                || reference.starts_with('#')
                || is_proxied_reference(reference)
            {
                return caps[0].to_string();
            }
            match resolve_relative(reference, base) {
                Some(target) => format!("url('{}')", target.proxied()),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
