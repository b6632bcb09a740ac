use anyhow::{Context, Result};
use regex::{Captures, Regex};
use select::document::Document;
use select::node::Node;
use select::predicate::{Attr, Name};
use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;
use url::Url;

use crate::canonical::{file_extension, has_asset_extension};
use crate::script_literals;

pub(crate) static CSS_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\((\s*)(?:"([^"]*)"|'([^']*)'|([^"'()\s]+))(\s*)\)"#)
        .expect("invalid css url() regex")
});

pub(crate) static CSS_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)@import(\s+)(?:"([^"]*)"|'([^']*)')"#).expect("invalid css @import regex")
});

/// Link relations that point at pages or hosts rather than assets.
const NAVIGATIONAL_RELS: &[&str] = &[
    "canonical",
    "alternate",
    "prev",
    "next",
    "preconnect",
    "dns-prefetch",
    "search",
];

/// Elements whose media attributes carry references. Extraction and
/// rewriting both read these tables so every fetched reference is rewritten.
pub(crate) const MEDIA_TAGS: &[&str] = &["img", "video", "audio", "source", "track"];
pub(crate) const MEDIA_SRC_ATTRS: &[&str] = &["src", "data-src"];
pub(crate) const MEDIA_SRCSET_ATTRS: &[&str] = &["srcset", "data-srcset"];
pub(crate) const MEDIA_POSTER_ATTR: &str = "poster";

const ICON_RELS: &[&str] = &["icon", "apple-touch-icon", "mask-icon", "manifest"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Html,
    Css,
    Script,
}

impl DocumentKind {
    pub fn from_path(path: &str) -> Option<Self> {
        match file_extension(path)?.as_str() {
            "html" | "htm" => Some(DocumentKind::Html),
            "css" => Some(DocumentKind::Css),
            "js" | "mjs" | "cjs" => Some(DocumentKind::Script),
            _ => None,
        }
    }
}

/// Where in a document a reference was written. The rewriter formats its
/// replacement differently for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceContext {
    HrefAttr,
    SrcAttr,
    SrcsetEntry,
    StyleUrl,
    CssUrlFunc,
    CssImport,
    InlineScriptLiteral,
}

/// Download class of a resource. Fetch order follows [`crate::downloader::DownloadPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Stylesheet,
    Script,
    Image,
    Font,
    Preload,
    Icon,
    Other,
}

impl AssetKind {
    pub fn from_path(path: &str) -> Self {
        let Some(ext) = file_extension(path) else {
            return AssetKind::Other;
        };
        match ext.as_str() {
            "css" => return AssetKind::Stylesheet,
            "js" | "mjs" | "cjs" => return AssetKind::Script,
            "eot" => return AssetKind::Font,
            _ => {}
        }

        match mime_guess::from_ext(&ext).first() {
            Some(mime) if mime.type_() == mime::IMAGE => AssetKind::Image,
            Some(mime) if mime.type_().as_str() == "font" => AssetKind::Font,
            _ => AssetKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    pub raw_value: String,
    pub context: ReferenceContext,
    pub containing_document_url: Url,
    /// Class implied by the element that carried the reference, if any.
    pub kind_hint: Option<AssetKind>,
}

impl ResourceReference {
    /// The hinted kind, falling back to the reference's extension.
    pub fn kind(&self) -> AssetKind {
        self.kind_hint.unwrap_or_else(|| {
            let path = crate::canonical::strip_query_and_fragment(&self.raw_value);
            AssetKind::from_path(path)
        })
    }
}

/// Pulls resource references out of HTML, CSS and script payloads.
#[derive(Clone)]
pub struct ReferenceExtractor {
    document_url: Url,
    excluded_literal_prefixes: Vec<String>,
}

impl ReferenceExtractor {
    pub fn new(document_url: &str, excluded_literal_prefixes: &[String]) -> Result<Self> {
        let document_url = Url::parse(document_url)
            .with_context(|| format!("Failed to parse document URL: {}", document_url))?;
        Ok(Self::for_url(document_url, excluded_literal_prefixes))
    }

    pub fn for_url(document_url: Url, excluded_literal_prefixes: &[String]) -> Self {
        Self {
            document_url,
            excluded_literal_prefixes: excluded_literal_prefixes.to_vec(),
        }
    }

    pub fn extract(&self, content: &str, kind: DocumentKind) -> Vec<ResourceReference> {
        let mut collector = Collector::new(&self.document_url);
        match kind {
            DocumentKind::Html => self.extract_html(content, &mut collector),
            DocumentKind::Css => self.extract_css(content, &mut collector),
            DocumentKind::Script => self.extract_script(content, &mut collector),
        }
        collector.finish()
    }

    fn extract_html(&self, content: &str, collector: &mut Collector) {
        let document = Document::from(content);

        for link in document.find(Name("link")) {
            if let Some(href) = link.attr("href") {
                let rels = rel_tokens(&link);
                if !link_href_is_asset(link.attr("rel"), href) {
                    continue;
                }
                collector.push(href, ReferenceContext::HrefAttr, link_hint(&link, &rels));
            }
        }

        for anchor in document.find(Name("a")) {
            if let Some(href) = anchor.attr("href") {
                if has_asset_extension(href) {
                    collector.push(href, ReferenceContext::HrefAttr, None);
                }
            }
        }

        for script in document.find(Name("script")) {
            match script.attr("src") {
                Some(src) => collector.push(src, ReferenceContext::SrcAttr, Some(AssetKind::Script)),
                None => self.extract_script(&script.text(), collector),
            }
        }

        let media = |node: &Node| node.name().map(|name| MEDIA_TAGS.contains(&name)).unwrap_or(false);
        for element in document.find(media) {
            let hint = match element.name() {
                Some("img") => Some(AssetKind::Image),
                _ => None,
            };
            for attr in MEDIA_SRC_ATTRS {
                if let Some(value) = element.attr(attr) {
                    collector.push(value, ReferenceContext::SrcAttr, hint);
                }
            }
            for attr in MEDIA_SRCSET_ATTRS {
                if let Some(value) = element.attr(attr) {
                    for range in srcset_urls(value) {
                        collector.push(&value[range], ReferenceContext::SrcsetEntry, hint);
                    }
                }
            }
            if let Some(poster) = element.attr(MEDIA_POSTER_ATTR) {
                collector.push(poster, ReferenceContext::SrcAttr, Some(AssetKind::Image));
            }
        }

        for element in document.find(Attr("style", ())) {
            if let Some(style) = element.attr("style") {
                for caps in CSS_URL_RE.captures_iter(style) {
                    if let Some(value) = css_url_value(&caps) {
                        collector.push(value.as_str(), ReferenceContext::StyleUrl, None);
                    }
                }
            }
        }

        for style in document.find(Name("style")) {
            self.extract_css(&style.text(), collector);
        }
    }

    fn extract_css(&self, content: &str, collector: &mut Collector) {
        for caps in CSS_IMPORT_RE.captures_iter(content) {
            if let Some(value) = caps.get(2).or_else(|| caps.get(3)) {
                collector.push(value.as_str(), ReferenceContext::CssImport, Some(AssetKind::Stylesheet));
            }
        }
        for caps in CSS_URL_RE.captures_iter(content) {
            if let Some(value) = css_url_value(&caps) {
                collector.push(value.as_str(), ReferenceContext::CssUrlFunc, None);
            }
        }
    }

    fn extract_script(&self, content: &str, collector: &mut Collector) {
        for span in script_literals::find_literals(content, &self.excluded_literal_prefixes) {
            collector.push(&span.value, ReferenceContext::InlineScriptLiteral, None);
        }
    }
}

/// Ordered, duplicate-free reference list for one document.
struct Collector<'a> {
    document_url: &'a Url,
    seen: HashSet<(String, ReferenceContext)>,
    references: Vec<ResourceReference>,
}

impl<'a> Collector<'a> {
    fn new(document_url: &'a Url) -> Self {
        Self {
            document_url,
            seen: HashSet::new(),
            references: Vec::new(),
        }
    }

    fn push(&mut self, raw_value: &str, context: ReferenceContext, kind_hint: Option<AssetKind>) {
        let raw_value = raw_value.trim();
        if raw_value.is_empty() {
            return;
        }
        if !self.seen.insert((raw_value.to_string(), context)) {
            return;
        }
        self.references.push(ResourceReference {
            raw_value: raw_value.to_string(),
            context,
            containing_document_url: self.document_url.clone(),
            kind_hint,
        });
    }

    fn finish(self) -> Vec<ResourceReference> {
        self.references
    }
}

/// Whether a `<link href>` with the given `rel` is fetched. Navigational
/// relations only qualify when the target has an asset extension.
pub(crate) fn link_href_is_asset(rel: Option<&str>, href: &str) -> bool {
    let navigational = rel
        .map(|rel| {
            rel.split_whitespace()
                .any(|token| NAVIGATIONAL_RELS.contains(&token.to_ascii_lowercase().as_str()))
        })
        .unwrap_or(false);
    !navigational || has_asset_extension(href)
}

fn rel_tokens(link: &Node) -> Vec<String> {
    link.attr("rel")
        .map(|rel| rel.split_whitespace().map(|token| token.to_ascii_lowercase()).collect())
        .unwrap_or_default()
}

fn link_hint(link: &Node, rels: &[String]) -> Option<AssetKind> {
    let has = |name: &str| rels.iter().any(|rel| rel == name);

    if has("stylesheet") {
        return Some(AssetKind::Stylesheet);
    }
    if has("modulepreload") {
        return Some(AssetKind::Script);
    }
    if rels.iter().any(|rel| ICON_RELS.contains(&rel.as_str())) {
        return Some(AssetKind::Icon);
    }
    if has("preload") || has("prefetch") {
        let kind = match link.attr("as").map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("style") => AssetKind::Stylesheet,
            Some("script") => AssetKind::Script,
            Some("font") => AssetKind::Font,
            Some("image") => AssetKind::Image,
            _ => AssetKind::Preload,
        };
        return Some(kind);
    }
    None
}

/// The URL inside a `url(...)` match, whichever quoting it used.
pub(crate) fn css_url_value<'t>(caps: &Captures<'t>) -> Option<regex::Match<'t>> {
    caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))
}

/// Byte ranges of the URL token of every `srcset` candidate. Descriptors and
/// surrounding whitespace are left out of the ranges.
pub(crate) fn srcset_urls(value: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    for segment in value.split(',') {
        let leading = segment.len() - segment.trim_start().len();
        let token = segment.trim_start().split_whitespace().next().unwrap_or("");
        if !token.is_empty() {
            let start = offset + leading;
            ranges.push(start..start + token.len());
        }
        offset += segment.len() + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(url: &str) -> ReferenceExtractor {
        ReferenceExtractor::new(url, &["/api/".to_string()]).unwrap()
    }

    fn values(refs: &[ResourceReference], context: ReferenceContext) -> Vec<&str> {
        refs.iter()
            .filter(|r| r.context == context)
            .map(|r| r.raw_value.as_str())
            .collect()
    }

    #[test]
    fn test_html_reference_extraction() {
        let html = r#"
            <html>
                <head>
                    <link rel="stylesheet" href="/css/site.css?v=2">
                    <link rel="preload" as="font" href="/fonts/Inter.woff2" crossorigin>
                    <link rel="icon" href="/favicon.ico">
                    <link rel="canonical" href="https://example.com/">
                    <script src="/js/app.js"></script>
                    <style>body { background: url("/img/bg.png"); } @import '/css/print.css';</style>
                </head>
                <body>
                    <img src="/img/logo.png" srcset="/img/logo-2x.png 2x, /img/logo-3x.png 3x" alt="">
                    <video poster="/img/poster.jpg"><source src="/media/intro.mp4"></video>
                    <div style="background-image: url('/img/hero.jpg')"></div>
                    <a href="/about">About</a>
                    <a href="/files/brochure.pdf">Brochure</a>
                </body>
            </html>
        "#;

        let refs = extractor("https://example.com/").extract(html, DocumentKind::Html);

        assert_eq!(
            values(&refs, ReferenceContext::HrefAttr),
            vec!["/css/site.css?v=2", "/fonts/Inter.woff2", "/favicon.ico", "/files/brochure.pdf"]
        );
        assert_eq!(
            values(&refs, ReferenceContext::SrcAttr),
            vec!["/js/app.js", "/img/logo.png", "/img/poster.jpg", "/media/intro.mp4"]
        );
        assert_eq!(
            values(&refs, ReferenceContext::SrcsetEntry),
            vec!["/img/logo-2x.png", "/img/logo-3x.png"]
        );
        assert_eq!(values(&refs, ReferenceContext::StyleUrl), vec!["/img/hero.jpg"]);
        assert_eq!(values(&refs, ReferenceContext::CssUrlFunc), vec!["/img/bg.png"]);
        assert_eq!(values(&refs, ReferenceContext::CssImport), vec!["/css/print.css"]);

        let kind_of = |raw: &str| refs.iter().find(|r| r.raw_value == raw).unwrap().kind();
        assert_eq!(kind_of("/css/site.css?v=2"), AssetKind::Stylesheet);
        assert_eq!(kind_of("/fonts/Inter.woff2"), AssetKind::Font);
        assert_eq!(kind_of("/favicon.ico"), AssetKind::Icon);
        assert_eq!(kind_of("/js/app.js"), AssetKind::Script);
        assert_eq!(kind_of("/img/hero.jpg"), AssetKind::Image);
        assert_eq!(kind_of("/files/brochure.pdf"), AssetKind::Other);
    }

    #[test]
    fn test_inline_script_literals_are_extracted() {
        let html = r#"<script id="__DATA__" type="application/json">{"logo":"\/img\/logo.svg","api":"/api/x.json"}</script>"#;
        let refs = extractor("https://example.com/").extract(html, DocumentKind::Html);
        assert_eq!(values(&refs, ReferenceContext::InlineScriptLiteral), vec!["/img/logo.svg"]);
    }

    #[test]
    fn test_css_extraction_tolerates_quoting() {
        let css = r#"
            @import "reset.css";
            @import url(theme.css);
            .a { background: url(../img/a.png) }
            .b { background: url( "../img/b.png" ) }
            .c { background: url('data:image/png;base64,AAAA') }
            @font-face { src: url('/fonts/Inter.woff2?v=1') format('woff2'); }
        "#;
        let refs = extractor("https://example.com/assets/css/site.css").extract(css, DocumentKind::Css);

        assert_eq!(values(&refs, ReferenceContext::CssImport), vec!["reset.css"]);
        assert_eq!(
            values(&refs, ReferenceContext::CssUrlFunc),
            vec![
                "theme.css",
                "../img/a.png",
                "../img/b.png",
                "data:image/png;base64,AAAA",
                "/fonts/Inter.woff2?v=1"
            ]
        );
        assert!(refs
            .iter()
            .all(|r| r.containing_document_url.as_str() == "https://example.com/assets/css/site.css"));
    }

    #[test]
    fn test_srcset_ranges_skip_descriptors() {
        let value = " a.png 1x,b.png  2x , c.png";
        let urls: Vec<&str> = srcset_urls(value).into_iter().map(|r| &value[r]).collect();
        assert_eq!(urls, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_asset_kind_from_path() {
        assert_eq!(AssetKind::from_path("/a/b.css"), AssetKind::Stylesheet);
        assert_eq!(AssetKind::from_path("/a/b.mjs"), AssetKind::Script);
        assert_eq!(AssetKind::from_path("/a/b.webp"), AssetKind::Image);
        assert_eq!(AssetKind::from_path("/a/b.woff2"), AssetKind::Font);
        assert_eq!(AssetKind::from_path("/a/b.eot"), AssetKind::Font);
        assert_eq!(AssetKind::from_path("/a/b.json"), AssetKind::Other);
        assert_eq!(AssetKind::from_path("/a/b"), AssetKind::Other);
        assert_eq!(DocumentKind::from_path("x/y.css"), Some(DocumentKind::Css));
        assert_eq!(DocumentKind::from_path("x/y.png"), None);
    }
}
