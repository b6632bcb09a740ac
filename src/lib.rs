pub mod canonical;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod file_manager;
pub mod mapping;
pub mod prefix;
pub mod rewriter;
pub mod script_literals;
pub mod session;

// Re-export main types for convenience
pub use canonical::{CanonicalAsset, Origin, Resolution};
pub use cli::MirrorCommand;
pub use config::MirrorConfig;
pub use downloader::{DownloadPhase, MirrorSummary, WebsiteMirror};
pub use error::{FetchError, MirrorError};
pub use extractor::{AssetKind, DocumentKind, ReferenceContext, ReferenceExtractor, ResourceReference};
pub use fetcher::{Fetcher, HttpFetcher};
pub use file_manager::{FileManager, LocalFileIndex};
pub use mapping::{DownloadLedger, DownloadRecord, PathMappingTable};
pub use prefix::{DetectedPrefix, PrefixDetector};
pub use rewriter::Rewriter;
pub use session::MirrorSession;
