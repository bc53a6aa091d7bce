use std::sync::LazyLock;

use regex::Regex;

static RE_NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\s-]").expect("invalid regex: non slug"));

static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid regex: whitespace"));

/// Turns a display name into the path segment used by the wiki.
///
/// `"MetalGreymon (Virus)"` becomes `"metalgreymon-virus"`. Only ASCII
/// letters, digits and hyphens survive, so the result is stable under a
/// second application.
pub fn slugify(name: &str) -> String {
    let stripped = RE_NON_SLUG.replace_all(name, "");
    let lowered = stripped.trim().to_lowercase();
    RE_WHITESPACE.replace_all(&lowered, "-").into_owned()
}

pub fn entity_url(base_url: &str, name: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), slugify(name))
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
