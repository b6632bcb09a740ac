use regex::{Captures, Match, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, trace};
use url::Url;

use crate::canonical::{encode_reference_path, fragment_of, has_asset_extension, is_asset_extension, Resolution};
use crate::extractor::{
    css_url_value, link_href_is_asset, srcset_urls, DocumentKind, ReferenceContext, CSS_IMPORT_RE, CSS_URL_RE,
    MEDIA_POSTER_ATTR, MEDIA_SRCSET_ATTRS, MEDIA_SRC_ATTRS, MEDIA_TAGS,
};
use crate::file_manager::LocalFileIndex;
use crate::script_literals::{escape_like, find_literals};
use crate::session::MirrorSession;

/// Attribute run of an opening tag. Quoted values may contain `>`.
const TAG_ATTRS: &str = r#"((?:[^>"']|"[^"]*"|'[^']*')*)"#;

static HTML_SCAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?is)<script\b{attrs}>(.*?)</script\s*>|<style\b{attrs}>(.*?)</style\s*>|<([a-z][a-z0-9-]*)\b{attrs}>",
        attrs = TAG_ATTRS
    );
    Regex::new(&pattern).expect("invalid html scan regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([^\s"'>/=]+)(\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("invalid attribute regex")
});


/// Where the file being rewritten lives: the URL it was fetched from and its
/// directory relative to the output root.
struct Location<'u> {
    document_url: &'u Url,
    from_dir: String,
}

/// Rewrites references in fetched content to point at the mirrored files.
///
/// Read-only over the session: it never fetches and never touches the
/// mapping table.
pub struct Rewriter<'a> {
    session: &'a MirrorSession,
    files: &'a LocalFileIndex,
    excluded_literal_prefixes: &'a [String],
}

impl<'a> Rewriter<'a> {
    pub fn new(session: &'a MirrorSession, files: &'a LocalFileIndex, excluded_literal_prefixes: &'a [String]) -> Self {
        Self {
            session,
            files,
            excluded_literal_prefixes,
        }
    }

    /// `local_path` is where the rewritten file will be written, relative to
    /// the output root.
    pub fn rewrite(&self, content: &str, kind: DocumentKind, document_url: &Url, local_path: &str) -> String {
        let location = Location {
            document_url,
            from_dir: parent_dir(local_path).to_string(),
        };
        match kind {
            DocumentKind::Html => self.rewrite_html(content, &location),
            DocumentKind::Css => self.rewrite_css(content, &location, ReferenceContext::CssUrlFunc),
            DocumentKind::Script => self.rewrite_script(content),
        }
    }

    fn rewrite_html(&self, content: &str, location: &Location) -> String {
        HTML_SCAN_RE
            .replace_all(content, |caps: &Captures| {
                let whole = caps.get(0).expect("group 0 always matches");
                let mut edits = Vec::new();

                if let Some(attrs) = caps.get(1) {
                    let rewritten = self.rewrite_tag_attributes("script", attrs.as_str(), location);
                    edits.push((attrs, rewritten));
                    if let Some(body) = caps.get(2) {
                        if !has_attribute(attrs.as_str(), "src") {
                            edits.push((body, self.rewrite_script(body.as_str())));
                        }
                    }
                } else if let Some(body) = caps.get(4) {
                    edits.push((body, self.rewrite_css(body.as_str(), location, ReferenceContext::CssUrlFunc)));
                } else if let (Some(name), Some(attrs)) = (caps.get(5), caps.get(6)) {
                    let tag = name.as_str().to_ascii_lowercase();
                    edits.push((attrs, self.rewrite_tag_attributes(&tag, attrs.as_str(), location)));
                }

                splice(whole, edits)
            })
            .into_owned()
    }

    fn rewrite_tag_attributes(&self, tag: &str, attrs: &str, location: &Location) -> String {
        let values: HashMap<String, String> = ATTR_RE
            .captures_iter(attrs)
            .filter_map(|caps| {
                let value = attr_value(&caps)?;
                Some((caps[1].to_ascii_lowercase(), value.as_str().to_string()))
            })
            .collect();

        ATTR_RE
            .replace_all(attrs, |caps: &Captures| {
                let whole = caps.get(0).expect("group 0 always matches");
                let Some(value) = attr_value(caps) else {
                    return whole.as_str().to_string();
                };
                let name = caps[1].to_ascii_lowercase();
                let raw = value.as_str();

                let media = MEDIA_TAGS.contains(&tag);
                let rewritten = match (tag, name.as_str()) {
                    ("link", "href") if link_href_is_asset(values.get("rel").map(String::as_str), raw) => {
                        self.resolve_reference(raw, location, ReferenceContext::HrefAttr)
                    }
                    ("a", "href") if has_asset_extension(raw) => {
                        self.resolve_reference(raw, location, ReferenceContext::HrefAttr)
                    }
                    ("script", "src") => self.resolve_reference(raw, location, ReferenceContext::SrcAttr),
                    (_, attr) if media && MEDIA_SRC_ATTRS.contains(&attr) => {
                        self.resolve_reference(raw, location, ReferenceContext::SrcAttr)
                    }
                    (_, attr) if media && MEDIA_SRCSET_ATTRS.contains(&attr) => Some(self.rewrite_srcset(raw, location)),
                    (_, attr) if media && attr == MEDIA_POSTER_ATTR => {
                        self.resolve_reference(raw, location, ReferenceContext::SrcAttr)
                    }
                    (_, "style") => Some(self.rewrite_css(raw, location, ReferenceContext::StyleUrl)),
                    _ => None,
                };

                match rewritten {
                    Some(new_value) if new_value != raw => splice(whole, vec![(value, new_value)]),
                    _ => whole.as_str().to_string(),
                }
            })
            .into_owned()
    }

    /// Rewrites each candidate URL, keeping descriptors and spacing verbatim.
    fn rewrite_srcset(&self, value: &str, location: &Location) -> String {
        let mut out = String::with_capacity(value.len());
        let mut last = 0;
        for range in srcset_urls(value) {
            out.push_str(&value[last..range.start]);
            let url = &value[range.clone()];
            match self.resolve_reference(url, location, ReferenceContext::SrcsetEntry) {
                Some(new_url) => out.push_str(&new_url),
                None => out.push_str(url),
            }
            last = range.end;
        }
        out.push_str(&value[last..]);
        out
    }

    fn rewrite_css(&self, content: &str, location: &Location, url_context: ReferenceContext) -> String {
        let imported = CSS_IMPORT_RE.replace_all(content, |caps: &Captures| {
            let whole = caps.get(0).expect("group 0 always matches");
            let value = caps.get(2).or_else(|| caps.get(3));
            self.splice_reference(whole, value, location, ReferenceContext::CssImport)
        });

        CSS_URL_RE
            .replace_all(&imported, |caps: &Captures| {
                let whole = caps.get(0).expect("group 0 always matches");
                self.splice_reference(whole, css_url_value(caps), location, url_context)
            })
            .into_owned()
    }

    /// Strips detected prefixes, then resolves remaining quoted absolute
    /// paths. Script strings are interpreted by the page, so everything here
    /// is made relative to the output root.
    fn rewrite_script(&self, content: &str) -> String {
        let mut text = content.to_string();
        let authority = self.session.origin().authority();

        for prefix in self.session.prefixes() {
            let mut forms = Vec::new();
            for scheme in ["https://", "http://", "//"] {
                forms.push(format!("{}{}{}", scheme, authority, prefix.path));
            }
            forms.push(prefix.path.clone());

            for form in forms {
                for escaping in [r"\\/", r"\/", "/"] {
                    let needle = form.replace('/', escaping);
                    text = replace_detached(&text, &needle, "");
                }
            }
        }

        let root = Location {
            document_url: self.session.entry_url(),
            from_dir: String::new(),
        };
        let spans = find_literals(&text, self.excluded_literal_prefixes);
        if spans.is_empty() {
            return text;
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for span in spans {
            out.push_str(&text[last..span.start]);
            match self.resolve_reference(&span.value, &root, ReferenceContext::InlineScriptLiteral) {
                Some(new_path) => out.push_str(&escape_like(&new_path, span.escaped)),
                None => out.push_str(&text[span.start..span.end]),
            }
            last = span.end;
        }
        out.push_str(&text[last..]);
        out
    }

    fn splice_reference(&self, whole: Match, value: Option<Match>, location: &Location, context: ReferenceContext) -> String {
        let Some(value) = value else {
            return whole.as_str().to_string();
        };
        match self.resolve_reference(value.as_str(), location, context) {
            Some(new_value) if new_value != value.as_str() => splice(whole, vec![(value, new_value)]),
            _ => whole.as_str().to_string(),
        }
    }

    /// Replacement text for one reference, or `None` to leave it untouched.
    ///
    /// Order: exact mapping, filename match, fuzzy filename match, then the
    /// absolute path with its leading slash removed.
    fn resolve_reference(&self, raw: &str, location: &Location, context: ReferenceContext) -> Option<String> {
        let raw = raw.trim();
        let asset = match self.session.resolve(raw, location.document_url) {
            Resolution::SameOrigin(asset) => asset,
            Resolution::Unresolvable(e) => {
                trace!(reference = raw, error = %e, "skipping unparseable reference");
                return None;
            }
            Resolution::Passthrough | Resolution::CrossOrigin(_) => return None,
        };
        let fragment = fragment_of(raw);

        if let Some(local) = self.session.mappings.lookup(&asset) {
            let relative = relative_path(local, &location.from_dir);
            return Some(format!("{}{}", encode_reference_path(&relative), fragment));
        }

        let recognized = asset.extension().map(|ext| is_asset_extension(&ext)).unwrap_or(false);
        if recognized {
            if let Some(found) = self.find_local_file(&asset.decoded_path) {
                debug!(reference = raw, found, ?context, "resolved reference by file name");
                let relative = relative_path(found, &location.from_dir);
                return Some(format!("{}{}", encode_reference_path(&relative), fragment));
            }
        }

        // Relative references that matched nothing are left as written.
        if !is_absolute_reference(raw) {
            return None;
        }
        let stripped = self
            .session
            .strip_prefix(&asset.raw_path)
            .unwrap_or_else(|| asset.raw_path.trim_start_matches('/'));
        let stripped = if stripped.is_empty() { "index.html" } else { stripped };
        debug!(reference = raw, fallback = stripped, ?context, "no mirrored file for reference");
        Some(format!("{}{}", relative_path(stripped, &location.from_dir), fragment))
    }

    fn find_local_file(&self, decoded_path: &str) -> Option<&'a str> {
        let name = decoded_path.rsplit('/').next().filter(|n| !n.is_empty())?;
        if let Some(found) = self.files.find_by_name(name) {
            return Some(found);
        }
        let file = Path::new(name);
        let stem = file.file_stem()?.to_str()?;
        let ext = file.extension()?.to_str()?;
        self.files.find_fuzzy(stem, ext)
    }
}

fn attr_value<'t>(caps: &Captures<'t>) -> Option<Match<'t>> {
    caps.get(3).or_else(|| caps.get(4)).or_else(|| caps.get(5))
}

fn has_attribute(attrs: &str, name: &str) -> bool {
    ATTR_RE
        .captures_iter(attrs)
        .any(|caps| caps[1].eq_ignore_ascii_case(name))
}

fn is_absolute_reference(raw: &str) -> bool {
    raw.starts_with('/') || raw.starts_with("http://") || raw.starts_with("https://")
}

/// Replaces sub-matches of `whole` with new text. Edits must not overlap.
fn splice(whole: Match, mut edits: Vec<(Match, String)>) -> String {
    edits.sort_by_key(|(m, _)| m.start());
    let text = whole.as_str();
    let base = whole.start();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (m, replacement) in edits {
        out.push_str(&text[last..m.start() - base]);
        out.push_str(&replacement);
        last = m.end() - base;
    }
    out.push_str(&text[last..]);
    out
}

/// Replaces occurrences of `needle` that are not glued to a preceding host
/// name, so `https://cdn.other/static/` keeps its path when `/static/` is stripped.
fn replace_detached(text: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() || !text.contains(needle) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (index, _) in text.match_indices(needle) {
        if index < last {
            continue;
        }
        let glued = text[..index]
            .chars()
            .next_back()
            .map(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '~' | '%' | ':'))
            .unwrap_or(false);
        if glued {
            continue;
        }
        out.push_str(&text[last..index]);
        out.push_str(replacement);
        last = index + needle.len();
    }
    out.push_str(&text[last..]);
    out
}

fn parent_dir(local_path: &str) -> &str {
    local_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// `target` (relative to the output root) as seen from `from_dir`.
fn relative_path(target: &str, from_dir: &str) -> String {
    if from_dir.is_empty() {
        return target.to_string();
    }
    match pathdiff::diff_paths(Path::new(target), Path::new(from_dir)) {
        Some(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        None => target.to_string(),
    }
}
