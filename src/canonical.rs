//! Reference canonicalization: turns whatever string a document used to point
//! at a resource into a comparable absolute identity and a local path.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::Path;
use url::Url;

/// Extensions treated as downloadable assets by the anchor filter, the script
/// literal heuristic and the fuzzy fallback.
pub const ASSET_EXTENSIONS: &[&str] = &[
    // scripts and styles
    "js", "mjs", "cjs", "css",
    // images
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "bmp",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // data
    "json", "xml", "txt", "map", "webmanifest", "wasm",
    // media
    "mp4", "webm", "mp3", "ogg", "wav", "m4a", "mov", "pdf",
];

const PASSTHROUGH_SCHEMES: &[&str] = &["data:", "javascript:", "mailto:", "tel:", "blob:", "about:"];

/// Characters escaped when a local path is written back into a reference.
const REFERENCE_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b'#')
    .add(b'%')
    .add(b'?')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'(')
    .add(b')')
    .add(b'\\');

/// The mirrored site's host and explicit port. Scheme is not compared:
/// `http://` and `https://` links to the same host are both same-origin, and
/// resolve to the entry document's scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    pub fn from_url(url: &Url) -> Option<Self> {
        Some(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_ascii_lowercase(),
            port: url.port(),
        })
    }

    pub fn matches(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| host.eq_ignore_ascii_case(&self.host))
            .unwrap_or(false)
            && url.port() == self.port
    }

    /// `host` or `host:port`, as it appears after `//` in an absolute URL.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

/// Identity of a fetchable same-origin resource. Query string and fragment are
/// already gone, so two references that differ only there compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalAsset {
    pub absolute_url: Url,
    /// Path as the URL parser normalized it, still percent-encoded.
    pub raw_path: String,
    pub decoded_path: String,
    pub has_extension: bool,
}

impl CanonicalAsset {
    pub fn from_url(mut url: Url) -> Self {
        url.set_query(None);
        url.set_fragment(None);
        let raw_path = url.path().to_string();
        let decoded_path = percent_decode_str(&raw_path).decode_utf8_lossy().into_owned();
        let has_extension = file_extension(&decoded_path).is_some();

        Self {
            absolute_url: url,
            raw_path,
            decoded_path,
            has_extension,
        }
    }

    pub fn local_path(&self) -> String {
        local_path_for(&self.decoded_path)
    }

    pub fn extension(&self) -> Option<String> {
        file_extension(&self.decoded_path)
    }
}

/// Outcome of canonicalizing one reference string.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// `data:`, `javascript:`, bare fragments and friends. Never fetched, never rewritten.
    Passthrough,
    CrossOrigin(Url),
    SameOrigin(CanonicalAsset),
    Unresolvable(url::ParseError),
}

/// Resolves `reference` against the URL of the document it was found in.
pub fn resolve(reference: &str, document_url: &Url, origin: &Origin) -> Resolution {
    let reference = reference.trim();

    if reference.is_empty() {
        let mut root = document_url.clone();
        root.set_path("/");
        return Resolution::SameOrigin(CanonicalAsset::from_url(root));
    }
    if is_passthrough(reference) {
        return Resolution::Passthrough;
    }

    let mut absolute = match document_url.join(reference) {
        Ok(url) => url,
        Err(e) => return Resolution::Unresolvable(e),
    };

    match absolute.scheme() {
        "http" | "https" => {}
        _ => return Resolution::Passthrough,
    }

    if origin.matches(&absolute) {
        if absolute.scheme() != origin.scheme {
            // http <-> https always succeeds; both are special schemes.
            let _ = absolute.set_scheme(&origin.scheme);
        }
        Resolution::SameOrigin(CanonicalAsset::from_url(absolute))
    } else {
        Resolution::CrossOrigin(absolute)
    }
}

pub fn is_passthrough(reference: &str) -> bool {
    if reference.starts_with('#') {
        return true;
    }
    let lowered = reference.get(..12).unwrap_or(reference).to_ascii_lowercase();
    PASSTHROUGH_SCHEMES
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
}

/// Maps a decoded absolute path onto the mirror's directory layout.
///
/// The root becomes `index.html`, and a path without an extension is treated
/// as a directory served through its index document.
pub fn local_path_for(decoded_path: &str) -> String {
    let segments: Vec<&str> = decoded_path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect();

    if segments.is_empty() {
        return "index.html".to_string();
    }

    let joined = segments.join("/");
    if decoded_path.ends_with('/') || file_extension(&joined).is_none() {
        format!("{}/index.html", joined)
    } else {
        joined
    }
}

/// Lowercased extension of the last path segment, if any.
pub fn file_extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn is_asset_extension(ext: &str) -> bool {
    ASSET_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext))
}

/// True when the path part of `reference` ends in a recognized asset extension.
pub fn has_asset_extension(reference: &str) -> bool {
    let path = strip_query_and_fragment(reference);
    file_extension(path)
        .map(|ext| is_asset_extension(&ext))
        .unwrap_or(false)
}

pub fn strip_query_and_fragment(reference: &str) -> &str {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    &reference[..end]
}

/// The `#fragment` of a reference, including the `#`, or an empty string.
pub fn fragment_of(reference: &str) -> &str {
    reference.find('#').map(|i| &reference[i..]).unwrap_or("")
}

/// Percent-encodes a local path so it is safe inside an attribute, `url()` or string literal.
pub fn encode_reference_path(path: &str) -> String {
    utf8_percent_encode(path, REFERENCE_UNSAFE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> (Url, Origin) {
        let url = Url::parse("https://example.com/").unwrap();
        let origin = Origin::from_url(&url).unwrap();
        (url, origin)
    }

    fn same_origin(reference: &str) -> CanonicalAsset {
        let (base, origin) = origin();
        match resolve(reference, &base, &origin) {
            Resolution::SameOrigin(asset) => asset,
            other => panic!("expected same-origin for {}, got {:?}", reference, other),
        }
    }

    #[test]
    fn test_query_and_fragment_do_not_change_identity() {
        let plain = same_origin("/css/site.css");
        let with_query = same_origin("https://example.com/css/site.css?v=42");
        let with_fragment = same_origin("css/site.css#top");

        assert_eq!(plain, with_query);
        assert_eq!(plain, with_fragment);
        assert_eq!(plain.local_path(), "css/site.css");
    }

    #[test]
    fn test_directory_index_inference() {
        assert_eq!(same_origin("/blog").local_path(), "blog/index.html");
        assert_eq!(same_origin("/blog/").local_path(), "blog/index.html");
        assert_eq!(same_origin("/").local_path(), "index.html");
        assert_eq!(same_origin("").local_path(), "index.html");
        assert_eq!(same_origin("https://example.com").local_path(), "index.html");
    }

    #[test]
    fn test_decoded_path_is_used_locally() {
        let asset = same_origin("/fonts/My%20Font.woff2");
        assert_eq!(asset.raw_path, "/fonts/My%20Font.woff2");
        assert_eq!(asset.decoded_path, "/fonts/My Font.woff2");
        assert_eq!(asset.local_path(), "fonts/My Font.woff2");

        let unencoded = same_origin("/fonts/My Font.woff2");
        assert_eq!(asset, unencoded);
    }

    #[test]
    fn test_relative_resolution_uses_document_url() {
        let (_, origin) = origin();
        let css = Url::parse("https://example.com/assets/css/site.css").unwrap();
        match resolve("../img/bg.png", &css, &origin) {
            Resolution::SameOrigin(asset) => assert_eq!(asset.local_path(), "assets/img/bg.png"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cross_origin_and_protocol_relative() {
        let (base, origin) = origin();
        assert!(matches!(
            resolve("https://other-domain.example/x.png", &base, &origin),
            Resolution::CrossOrigin(_)
        ));
        assert!(matches!(
            resolve("//cdn.example.com/lib.js", &base, &origin),
            Resolution::CrossOrigin(_)
        ));
        assert!(matches!(
            resolve("//example.com/lib.js", &base, &origin),
            Resolution::SameOrigin(_)
        ));
        assert!(matches!(
            resolve("http://example.com/lib.js", &base, &origin),
            Resolution::SameOrigin(_)
        ));
        assert!(matches!(
            resolve("https://example.com:8443/lib.js", &base, &origin),
            Resolution::CrossOrigin(_)
        ));
    }

    #[test]
    fn test_scheme_variants_share_one_identity() {
        let secure = same_origin("https://example.com/js/app.js");
        let plain = same_origin("http://example.com/js/app.js");

        assert_eq!(secure, plain);
        assert_eq!(plain.absolute_url.as_str(), "https://example.com/js/app.js");
    }

    #[test]
    fn test_passthrough_references() {
        let (base, origin) = origin();
        for reference in ["data:image/png;base64,AAAA", "javascript:void(0)", "#main", "mailto:a@b.c", "DATA:text/plain,x"] {
            assert_eq!(resolve(reference, &base, &origin), Resolution::Passthrough, "{}", reference);
        }
    }

    #[test]
    fn test_unparseable_reference_is_reported() {
        let (base, origin) = origin();
        assert!(matches!(
            resolve("http://[::1/broken.png", &base, &origin),
            Resolution::Unresolvable(_)
        ));
    }

    #[test]
    fn test_asset_extension_helpers() {
        assert!(has_asset_extension("/files/report.PDF?download=1"));
        assert!(has_asset_extension("logo.svg#icon"));
        assert!(!has_asset_extension("/about"));
        assert!(!has_asset_extension("/page.php"));
        assert_eq!(fragment_of("font.eot?#iefix"), "#iefix");
        assert_eq!(strip_query_and_fragment("a/b.css?v=1#x"), "a/b.css");
        assert_eq!(encode_reference_path("fonts/My Font.woff2"), "fonts/My%20Font.woff2");
    }
}
