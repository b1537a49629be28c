//! Neutralizes scripted top-level navigation and `document.domain` writes.
//!
//! The assignment target and operator are replaced with `void `, turning
//! `window.location = url` into the harmless expression `void url`.
//! Comparisons (`==`, `===`) and member chains such as `foo.location.href`
//! are left alone.

use std::sync::LazyLock;

use regex::Regex;

static NAVIGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(?P<lead>^|[^\w.$])(?:window\.location(?:\.href)?|location\.href|document\.domain)\s*=(?P<next>[^=]|$)",
    )
    .expect("valid navigation regex")
});

pub fn rewrite_js(js: &str) -> String {
    NAVIGATION_RE
        .replace_all(js, "${lead}void ${next}")
        .into_owned()
}
