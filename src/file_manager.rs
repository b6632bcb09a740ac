use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Filesystem access rooted at the output directory. All paths taken and
/// returned are `/`-separated and relative to that root.
#[derive(Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    /// Nothing is created on disk until the first write.
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn full_path(&self, relative: &str) -> PathBuf {
        let mut path = self.base_dir.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    pub fn save_file(&self, relative: &str, content: &[u8]) -> Result<PathBuf> {
        let file_path = self.full_path(relative);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let mut file = fs::File::create(&file_path)
            .with_context(|| format!("Failed to create file: {:?}", file_path))?;
        file.write_all(content)
            .with_context(|| format!("Failed to write to file: {:?}", file_path))?;

        Ok(file_path)
    }

    pub fn read_file(&self, relative: &str) -> Result<Vec<u8>> {
        let file_path = self.full_path(relative);
        fs::read(&file_path).with_context(|| format!("Failed to read file: {:?}", file_path))
    }

    /// Every file under the root, visited in file-name order at each level.
    pub fn walk(&self) -> Vec<String> {
        if !self.base_dir.exists() {
            return Vec::new();
        }

        WalkDir::new(&self.base_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.base_dir).ok()?;
                let segments: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some(segments.join("/"))
            })
            .collect()
    }
}

/// Snapshot of the files on disk used for filename-based fallback lookups.
///
/// Lookups return the first hit in walk order. When two directories hold a
/// file with the same name, the one sorting first wins.
#[derive(Debug, Default, Clone)]
pub struct LocalFileIndex {
    files: Vec<String>,
}

impl LocalFileIndex {
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }

    pub fn from_disk(file_manager: &FileManager) -> Self {
        Self::new(file_manager.walk())
    }

    pub fn find_by_name(&self, file_name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|path| file_name_of(path) == file_name)
            .map(String::as_str)
    }

    /// First file with the same extension whose name contains `stem`, which
    /// tolerates content hashes spliced into bundled file names.
    pub fn find_fuzzy(&self, stem: &str, extension: &str) -> Option<&str> {
        if stem.is_empty() {
            return None;
        }
        self.files
            .iter()
            .find(|path| {
                let name = file_name_of(path);
                crate::canonical::file_extension(name)
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
                    && name.contains(stem)
            })
            .map(String::as_str)
    }
}

fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
