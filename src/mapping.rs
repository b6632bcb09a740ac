use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

use crate::canonical::CanonicalAsset;
use crate::extractor::AssetKind;

/// Absolute request path (encoded and decoded forms) → path relative to the
/// output root. Entries are first-writer-wins.
#[derive(Debug, Default, Clone)]
pub struct PathMappingTable {
    entries: HashMap<String, String>,
}

impl PathMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `local_path` under both path forms of `asset`.
    pub fn record(&mut self, asset: &CanonicalAsset, local_path: &str) {
        self.insert(&asset.raw_path, local_path);
        if asset.decoded_path != asset.raw_path {
            self.insert(&asset.decoded_path, local_path);
        }
    }

    /// Returns `false` when the key already maps somewhere; the existing value is kept.
    pub fn insert(&mut self, key: &str, local_path: &str) -> bool {
        match self.entries.get(key) {
            Some(existing) => {
                if existing != local_path {
                    warn!(key, existing = %existing, rejected = local_path, "path mapping already set");
                }
                false
            }
            None => {
                self.entries.insert(key.to_string(), local_path.to_string());
                true
            }
        }
    }

    pub fn lookup(&self, asset: &CanonicalAsset) -> Option<&str> {
        self.get(&asset.raw_path)
            .or_else(|| self.get(&asset.decoded_path))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub canonical_url: String,
    pub local_path: String,
    pub kind: AssetKind,
    pub succeeded: bool,
}

/// The dedup set. A canonical URL is attempted at most once per run, and a
/// failed attempt is final.
#[derive(Debug, Default, Clone)]
pub struct DownloadLedger {
    index: HashMap<String, usize>,
    records: Vec<DownloadRecord>,
}

impl DownloadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, asset: &CanonicalAsset) -> bool {
        self.index.contains_key(asset.absolute_url.as_str())
    }

    pub fn record(&mut self, asset: &CanonicalAsset, local_path: &str, kind: AssetKind, succeeded: bool) {
        let canonical_url = asset.absolute_url.to_string();
        if self.index.contains_key(&canonical_url) {
            return;
        }
        self.index.insert(canonical_url.clone(), self.records.len());
        self.records.push(DownloadRecord {
            canonical_url,
            local_path: local_path.to_string(),
            kind,
            succeeded,
        });
    }

    /// Records in the order they were attempted.
    pub fn records(&self) -> &[DownloadRecord] {
        &self.records
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter().filter(|record| record.succeeded)
    }
}
