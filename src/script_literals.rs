//! Best-effort detection of asset paths inside script payloads.
//!
//! Bundled JavaScript and inline JSON carry asset paths as plain string
//! literals. There is no structure to parse, so this module matches quoted
//! strings that start with `/`, contain only path-safe characters and end in
//! a known asset extension. It will miss paths built by concatenation and it
//! will rewrite any literal that merely looks like an asset path. Callers only
//! see [`find_literals`], so a stricter lexer can replace it later.

use regex::Regex;
use std::sync::LazyLock;

use crate::canonical::ASSET_EXTENSIONS;

static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    let extensions = ASSET_EXTENSIONS.join("|");
    let pattern = format!(
        r#"["'`]((?:\\/|/)(?:[A-Za-z0-9_\-.~@%+=,:]|\\/|/)*?\.(?i:{})(?:\?[A-Za-z0-9_\-.~%=&]*)?)["'`]"#,
        extensions
    );
    Regex::new(&pattern).expect("invalid script literal regex")
});

/// A quoted asset path found in a script payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralSpan {
    /// Byte range of the path inside the quotes.
    pub start: usize,
    pub end: usize,
    /// The path with `\/` escapes removed, query string included.
    pub value: String,
    /// Whether the literal wrote its slashes as `\/`.
    pub escaped: bool,
}

pub fn find_literals(content: &str, excluded_prefixes: &[String]) -> Vec<LiteralSpan> {
    LITERAL_RE
        .captures_iter(content)
        .filter_map(|caps| {
            let path = caps.get(1)?;
            let text = path.as_str();
            let escaped = text.contains("\\/");
            let value = text.replace("\\/", "/");

            if value.starts_with("//") {
                return None;
            }
            if excluded_prefixes.iter().any(|prefix| value.starts_with(prefix.as_str())) {
                return None;
            }

            Some(LiteralSpan {
                start: path.start(),
                end: path.end(),
                value,
                escaped,
            })
        })
        .collect()
}

/// Writes `path` back in the escaping style of the literal it replaces.
pub fn escape_like(path: &str, escaped: bool) -> String {
    if escaped {
        path.replace('/', "\\/")
    } else {
        path.to_string()
    }
}
