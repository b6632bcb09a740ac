use anyhow::Result;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use crate::canonical::{CanonicalAsset, Resolution};
use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::extractor::{AssetKind, DocumentKind, ReferenceExtractor, ResourceReference};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::file_manager::{FileManager, LocalFileIndex};
use crate::prefix::{DetectedPrefix, PrefixDetector};
use crate::rewriter::Rewriter;
use crate::session::{MirrorSession, ENTRY_DOCUMENT};

/// Download classes, fetched strictly one after another in [`DownloadPhase::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadPhase {
    Stylesheets,
    Scripts,
    Images,
    Fonts,
    Other,
    /// Everything the downloaded stylesheets reference, transitively.
    StylesheetDependencies,
}

impl DownloadPhase {
    pub const ORDER: [DownloadPhase; 6] = [
        DownloadPhase::Stylesheets,
        DownloadPhase::Scripts,
        DownloadPhase::Images,
        DownloadPhase::Fonts,
        DownloadPhase::Other,
        DownloadPhase::StylesheetDependencies,
    ];

    pub fn for_kind(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Stylesheet => DownloadPhase::Stylesheets,
            AssetKind::Script => DownloadPhase::Scripts,
            AssetKind::Image => DownloadPhase::Images,
            AssetKind::Font => DownloadPhase::Fonts,
            AssetKind::Preload | AssetKind::Icon | AssetKind::Other => DownloadPhase::Other,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DownloadPhase::Stylesheets => "stylesheets",
            DownloadPhase::Scripts => "scripts",
            DownloadPhase::Images => "images",
            DownloadPhase::Fonts => "fonts",
            DownloadPhase::Other => "icons, manifests and other files",
            DownloadPhase::StylesheetDependencies => "resources referenced by stylesheets",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorSummary {
    pub entry_path: PathBuf,
    pub downloaded: usize,
    pub failed: usize,
    pub per_kind: BTreeMap<AssetKind, usize>,
    pub rewritten_files: usize,
    pub prefixes: Vec<DetectedPrefix>,
}

pub struct WebsiteMirror<F: Fetcher = HttpFetcher> {
    config: MirrorConfig,
    fetcher: F,
    file_manager: FileManager,
    session: MirrorSession,
}

impl WebsiteMirror<HttpFetcher> {
    pub fn new(base_url: &str, output_dir: &Path, config: MirrorConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Self::with_fetcher(base_url, output_dir, config, fetcher)
    }
}

impl<F: Fetcher> WebsiteMirror<F> {
    pub fn with_fetcher(base_url: &str, output_dir: &Path, config: MirrorConfig, fetcher: F) -> Result<Self> {
        let session = MirrorSession::new(base_url, output_dir)?;
        Ok(Self {
            config,
            fetcher,
            file_manager: FileManager::new(session.output_root()),
            session,
        })
    }

    pub fn session(&self) -> &MirrorSession {
        &self.session
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Runs the whole mirror. Only an unreachable entry document (or failing
    /// to write the final `index.html`) is an error; missing assets are not.
    pub async fn mirror_website(&mut self) -> Result<MirrorSummary> {
        let entry_url = self.session.entry_url().clone();
        println!("🚀 Starting website mirroring for: {}", entry_url.as_str().blue());
        println!("📁 Output directory: {:?}", self.file_manager.base_dir());

        let entry_bytes = match self.fetcher.fetch(&entry_url).await {
            Ok(bytes) => bytes,
            Err(source) => {
                eprintln!("❌ Cannot reach entry document {}: {}", entry_url, source);
                return Err(MirrorError::EntryUnreachable {
                    url: entry_url.to_string(),
                    source,
                }
                .into());
            }
        };
        self.pace().await;

        // The entry document is rewritten from these bytes, never from a copy on disk.
        let original_html = String::from_utf8_lossy(&entry_bytes).into_owned();

        let extractor = ReferenceExtractor::for_url(entry_url.clone(), &self.config.excluded_literal_prefixes);
        let references = extractor.extract(&original_html, DocumentKind::Html);
        println!("🔍 Found {} references in the entry document", references.len());

        let detector = PrefixDetector::new(&self.config.asset_markers, self.config.min_prefix_occurrences);
        let prefixes = detector.detect(&original_html, self.session.origin());
        for prefix in &prefixes {
            println!("🧭 Detected asset prefix {} ({} occurrences)", prefix.path.cyan(), prefix.occurrences);
        }
        self.session.set_prefixes(prefixes);
        self.session.seed_entry();

        let mut queues: HashMap<DownloadPhase, Vec<ResourceReference>> = HashMap::new();
        for reference in references {
            queues
                .entry(DownloadPhase::for_kind(reference.kind()))
                .or_default()
                .push(reference);
        }

        for phase in DownloadPhase::ORDER {
            match phase {
                DownloadPhase::StylesheetDependencies => self.download_stylesheet_dependencies().await,
                _ => {
                    let references = queues.remove(&phase).unwrap_or_default();
                    self.download_phase(phase, references).await;
                }
            }
        }

        println!("\n✏️  Rewriting references in downloaded stylesheets and scripts...");
        let index = LocalFileIndex::from_disk(&self.file_manager);
        let rewriter = Rewriter::new(&self.session, &index, &self.config.excluded_literal_prefixes);
        let rewritten_files = self.rewrite_downloaded_files(&rewriter);

        let entry_html = rewriter.rewrite(&original_html, DocumentKind::Html, &entry_url, ENTRY_DOCUMENT);
        let entry_path = self.file_manager.save_file(ENTRY_DOCUMENT, entry_html.as_bytes())?;
        println!("💾 Saved entry document to: {:?}", entry_path);

        let summary = self.summarize(entry_path, rewritten_files);
        self.print_summary(&summary);
        Ok(summary)
    }

    async fn download_phase(&mut self, phase: DownloadPhase, references: Vec<ResourceReference>) {
        if references.is_empty() {
            return;
        }
        println!("\n📦 Downloading {} ({})", phase.label().bold(), references.len());

        let progress = phase_progress(references.len() as u64);
        for reference in &references {
            progress.set_message(reference.raw_value.clone());
            self.download_reference(reference, &progress).await;
            progress.inc(1);
        }
        progress.finish_and_clear();
    }

    /// Parses every downloaded stylesheet and fetches what it points at.
    /// Stylesheets found this way are parsed too, until nothing new turns up.
    async fn download_stylesheet_dependencies(&mut self) {
        let stylesheets: Vec<(String, String)> = self
            .session
            .downloads
            .succeeded()
            .filter(|record| record.kind == AssetKind::Stylesheet)
            .map(|record| (record.canonical_url.clone(), record.local_path.clone()))
            .collect();

        let mut pending: VecDeque<ResourceReference> = VecDeque::new();
        for (url, local_path) in &stylesheets {
            pending.extend(self.stylesheet_references(url, local_path));
        }
        if pending.is_empty() {
            return;
        }

        println!(
            "\n📦 Downloading {} ({})",
            DownloadPhase::StylesheetDependencies.label().bold(),
            pending.len()
        );
        let progress = phase_progress(pending.len() as u64);

        while let Some(reference) = pending.pop_front() {
            progress.set_message(reference.raw_value.clone());
            if let Some(asset) = self.download_reference(&reference, &progress).await {
                if reference.kind() == AssetKind::Stylesheet {
                    let local_path = self.session.local_path(&asset);
                    let nested = self.stylesheet_references(asset.absolute_url.as_str(), &local_path);
                    progress.inc_length(nested.len() as u64);
                    pending.extend(nested);
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();
    }

    fn stylesheet_references(&self, url: &str, local_path: &str) -> Vec<ResourceReference> {
        let Ok(css_url) = Url::parse(url) else {
            return Vec::new();
        };
        let content = match self.file_manager.read_file(local_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                eprintln!("⚠️  Failed to parse stylesheet {}: {:#}", local_path, e);
                return Vec::new();
            }
        };
        ReferenceExtractor::for_url(css_url, &self.config.excluded_literal_prefixes).extract(&content, DocumentKind::Css)
    }

    /// Canonicalizes, dedups and fetches one reference. Returns the asset when
    /// this call downloaded it.
    async fn download_reference(&mut self, reference: &ResourceReference, progress: &ProgressBar) -> Option<CanonicalAsset> {
        let asset = match self
            .session
            .resolve(&reference.raw_value, &reference.containing_document_url)
        {
            Resolution::SameOrigin(asset) => asset,
            Resolution::CrossOrigin(url) => {
                debug!(%url, "leaving cross-origin reference untouched");
                return None;
            }
            Resolution::Passthrough => return None,
            Resolution::Unresolvable(e) => {
                progress.println(format!("⏭️  Skipping unparseable reference {}: {}", reference.raw_value, e));
                return None;
            }
        };

        if self.session.downloads.contains(&asset) {
            debug!(url = %asset.absolute_url, "already attempted");
            return None;
        }

        let kind = reference.kind();
        let local_path = self.session.local_path(&asset);
        let outcome = match self.fetcher.fetch(&asset.absolute_url).await {
            Ok(bytes) => self
                .file_manager
                .save_file(&local_path, &bytes)
                .map(|_| ())
                .map_err(|e| format!("{:#}", e)),
            Err(e) => Err(e.to_string()),
        };
        self.pace().await;

        match outcome {
            Ok(()) => {
                progress.println(format!("  {} {} -> {}", "✓".green(), asset.absolute_url, local_path));
                self.session.downloads.record(&asset, &local_path, kind, true);
                self.session.mappings.record(&asset, &local_path);
                Some(asset)
            }
            Err(message) => {
                progress.println(format!("  {} {} - {}", "✗".red(), asset.absolute_url, message));
                warn!(url = %asset.absolute_url, error = %message, "download failed");
                self.session.downloads.record(&asset, &local_path, kind, false);
                None
            }
        }
    }

    fn rewrite_downloaded_files(&self, rewriter: &Rewriter) -> usize {
        let targets: Vec<(Url, String, DocumentKind)> = self
            .session
            .downloads
            .succeeded()
            .filter(|record| record.local_path != ENTRY_DOCUMENT)
            .filter_map(|record| {
                let kind = DocumentKind::from_path(&record.local_path)?;
                if kind == DocumentKind::Html {
                    return None;
                }
                let url = Url::parse(&record.canonical_url).ok()?;
                Some((url, record.local_path.clone(), kind))
            })
            .collect();

        let mut rewritten = 0;
        for (url, local_path, kind) in targets {
            match self.rewrite_file(rewriter, &url, &local_path, kind) {
                Ok(true) => {
                    info!(file = %local_path, "rewrote references");
                    rewritten += 1;
                }
                Ok(false) => {}
                Err(e) => eprintln!("⚠️  Failed to rewrite {}: {:#}", local_path, e),
            }
        }
        rewritten
    }

    fn rewrite_file(&self, rewriter: &Rewriter, url: &Url, local_path: &str, kind: DocumentKind) -> Result<bool> {
        let bytes = self.file_manager.read_file(local_path)?;
        let Ok(content) = String::from_utf8(bytes) else {
            warn!(file = %local_path, "not valid UTF-8, leaving as downloaded");
            return Ok(false);
        };

        let rewritten = rewriter.rewrite(&content, kind, url, local_path);
        if rewritten == content {
            return Ok(false);
        }
        self.file_manager.save_file(local_path, rewritten.as_bytes())?;
        Ok(true)
    }

    fn summarize(&self, entry_path: PathBuf, rewritten_files: usize) -> MirrorSummary {
        let mut summary = MirrorSummary {
            entry_path,
            rewritten_files,
            prefixes: self.session.prefixes().to_vec(),
            ..MirrorSummary::default()
        };
        for record in self.session.downloads.records() {
            if record.local_path == ENTRY_DOCUMENT {
                continue;
            }
            if record.succeeded {
                summary.downloaded += 1;
                *summary.per_kind.entry(record.kind).or_insert(0) += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }

    fn print_summary(&self, summary: &MirrorSummary) {
        println!("\n📊 Resources downloaded: {}", summary.downloaded.to_string().green());
        for (kind, count) in &summary.per_kind {
            println!("   - {:?}: {}", kind, count);
        }
        if summary.failed > 0 {
            println!("⚠️  Resources failed: {}", summary.failed.to_string().red());
        }
        println!("✏️  Files rewritten: {}", summary.rewritten_files);
    }

    async fn pace(&self) {
        let delay = self.config.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn phase_progress(len: u64) -> ProgressBar {
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress
}
