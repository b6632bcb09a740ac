//! Detection of deployment-specific asset prefixes.
//!
//! Bundlers often put a path such as `/cdn/build-123/` in front of every
//! asset they emit, including inside minified script payloads where the path
//! is just a substring. Counting the segments that precede a known bundler
//! marker (`/_next/` by default) in the entry document recovers those
//! prefixes so the rewriter can strip them wherever they appear.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::canonical::Origin;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedPrefix {
    /// Always starts and ends with `/`.
    pub path: String,
    pub occurrences: usize,
}

pub struct PrefixDetector {
    marker_res: Vec<Regex>,
    min_occurrences: usize,
}

impl PrefixDetector {
    pub fn new(markers: &[String], min_occurrences: usize) -> Self {
        let marker_res = markers
            .iter()
            .filter_map(|marker| {
                let pattern = format!(
                    r#"(?:^|["'(\s=,])(?:(?:https?:)?//([A-Za-z0-9.\-]+(?::\d+)?))?(/[A-Za-z0-9_\-.~%@+/]*?)?/{}/"#,
                    regex::escape(marker.trim_matches('/'))
                );
                Regex::new(&pattern).ok()
            })
            .collect();

        Self {
            marker_res,
            min_occurrences: min_occurrences.max(1),
        }
    }

    /// Returns every prefix seen at least `min_occurrences` times, most
    /// frequent first, longest first among equals.
    pub fn detect(&self, html: &str, origin: &Origin) -> Vec<DetectedPrefix> {
        let unescaped = html.replace("\\\\/", "/").replace("\\/", "/");
        let mut counts: HashMap<String, usize> = HashMap::new();

        for re in &self.marker_res {
            for caps in re.captures_iter(&unescaped) {
                if let Some(authority) = caps.get(1) {
                    if !same_authority(authority.as_str(), origin) {
                        continue;
                    }
                }
                let Some(path) = caps.get(2).map(|m| m.as_str()) else {
                    continue;
                };
                if path.starts_with("//") || path.trim_matches('/').is_empty() {
                    continue;
                }
                *counts.entry(format!("{}/", path.trim_end_matches('/'))).or_insert(0) += 1;
            }
        }

        let mut prefixes: Vec<DetectedPrefix> = counts
            .into_iter()
            .filter(|(_, occurrences)| *occurrences >= self.min_occurrences)
            .map(|(path, occurrences)| DetectedPrefix { path, occurrences })
            .collect();
        prefixes.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| b.path.len().cmp(&a.path.len()))
                .then_with(|| a.path.cmp(&b.path))
        });

        for prefix in &prefixes {
            debug!(prefix = %prefix.path, occurrences = prefix.occurrences, "detected asset prefix");
        }
        prefixes
    }
}

fn same_authority(authority: &str, origin: &Origin) -> bool {
    Url::parse(&format!("http://{}/", authority))
        .map(|url| origin.matches(&url))
        .unwrap_or(false)
}
