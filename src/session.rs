use std::path::{Path, PathBuf};
use url::Url;

use crate::canonical::{self, CanonicalAsset, Origin, Resolution};
use crate::error::MirrorError;
use crate::extractor::AssetKind;
use crate::mapping::{DownloadLedger, PathMappingTable};
use crate::prefix::DetectedPrefix;

pub const ENTRY_DOCUMENT: &str = "index.html";

/// State owned by one mirroring run. Nothing here survives the run; a fresh
/// session starts with an empty mapping table even if the output directory
/// already holds files.
#[derive(Debug)]
pub struct MirrorSession {
    entry_url: Url,
    origin: Origin,
    output_root: PathBuf,
    pub mappings: PathMappingTable,
    pub downloads: DownloadLedger,
    prefixes: Vec<DetectedPrefix>,
}

impl MirrorSession {
    pub fn new(entry_url: &str, output_root: &Path) -> Result<Self, MirrorError> {
        let parsed = Url::parse(entry_url).map_err(|source| MirrorError::InvalidUrl {
            url: entry_url.to_string(),
            source,
        })?;
        let origin =
            Origin::from_url(&parsed).ok_or_else(|| MirrorError::MissingHost(entry_url.to_string()))?;

        Ok(Self {
            entry_url: parsed,
            origin,
            output_root: output_root.to_path_buf(),
            mappings: PathMappingTable::new(),
            downloads: DownloadLedger::new(),
            prefixes: Vec::new(),
        })
    }

    pub fn entry_url(&self) -> &Url {
        &self.entry_url
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn resolve(&self, reference: &str, document_url: &Url) -> Resolution {
        canonical::resolve(reference, document_url, &self.origin)
    }

    pub fn prefixes(&self) -> &[DetectedPrefix] {
        &self.prefixes
    }

    /// Prefixes are kept longest first so nested prefixes never shadow each other.
    pub fn set_prefixes(&mut self, mut prefixes: Vec<DetectedPrefix>) {
        prefixes.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        self.prefixes = prefixes;
    }

    /// The rest of `path` after a detected prefix, without a leading slash.
    pub fn strip_prefix<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.prefixes
            .iter()
            .find_map(|prefix| path.strip_prefix(prefix.path.as_str()))
    }

    /// Where `asset` lives under the output root. Detected prefixes are
    /// flattened away so paths stripped inside script payloads still resolve.
    pub fn local_path(&self, asset: &CanonicalAsset) -> String {
        match self.strip_prefix(&asset.decoded_path) {
            Some(rest) => canonical::local_path_for(&format!("/{}", rest)),
            None => asset.local_path(),
        }
    }

    /// Marks the entry document as already downloaded so no reference can
    /// fetch it again or claim `index.html`.
    pub fn seed_entry(&mut self) {
        let entry = CanonicalAsset::from_url(self.entry_url.clone());
        self.downloads.record(&entry, ENTRY_DOCUMENT, AssetKind::Other, true);
        self.mappings.record(&entry, ENTRY_DOCUMENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(url: &str) -> CanonicalAsset {
        CanonicalAsset::from_url(Url::parse(url).unwrap())
    }

    #[test]
    fn test_invalid_entry_url() {
        assert!(matches!(
            MirrorSession::new("not a url", Path::new("out")),
            Err(MirrorError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_local_path_flattens_detected_prefix() {
        let mut session = MirrorSession::new("https://example.com/", Path::new("out")).unwrap();
        session.set_prefixes(vec![
            DetectedPrefix { path: "/static/".to_string(), occurrences: 5 },
            DetectedPrefix { path: "/static/build-123/".to_string(), occurrences: 2 },
        ]);

        assert_eq!(
            session.local_path(&asset("https://example.com/static/build-123/_next/static/app.js")),
            "_next/static/app.js"
        );
        assert_eq!(session.local_path(&asset("https://example.com/static/logo.png")), "logo.png");
        assert_eq!(session.local_path(&asset("https://example.com/img/a.png")), "img/a.png");
    }

    #[test]
    fn test_seed_entry_claims_index() {
        let mut session = MirrorSession::new("https://example.com/docs/intro", Path::new("out")).unwrap();
        session.seed_entry();

        let entry = asset("https://example.com/docs/intro?ref=home");
        assert!(session.downloads.contains(&entry));
        assert_eq!(session.mappings.lookup(&entry), Some("index.html"));
    }
}
