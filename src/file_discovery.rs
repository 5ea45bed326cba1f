//! Discovery of XML documents for batch validation

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tokio::fs;

use crate::error::{Error, Result};

/// Walks a file or directory tree and selects documents by extension and glob
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// Lower-case extensions to accept, without the dot
    extensions: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
    /// Deepest directory level entered below the root (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

/// Counts gathered during one discovery pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub files_found: usize,
    /// Entries that could not be inspected and were skipped
    pub errors: usize,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_set: None,
            exclude_set: None,
            max_depth: None,
            follow_symlinks: false,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Only accept paths matching at least one of `patterns`
    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.include_set = build_glob_set(&patterns, "include")?;
        Ok(self)
    }

    /// Reject paths matching any of `patterns`
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.exclude_set = build_glob_set(&patterns, "exclude")?;
        Ok(self)
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Files under `path`, sorted; `path` itself when it is an accepted file
    pub async fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        Ok(self.discover_with_stats(path).await?.0)
    }

    pub async fn discover_with_stats(&self, path: &Path) -> Result<(Vec<PathBuf>, DiscoveryStats)> {
        let metadata = fs::metadata(path).await?;
        let mut stats = DiscoveryStats::default();

        if metadata.is_file() {
            let files = if self.should_process(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            };
            stats.files_found = files.len();
            return Ok((files, stats));
        }

        let mut files = Vec::new();
        let mut pending = VecDeque::from([(path.to_path_buf(), 0usize)]);

        while let Some((dir, depth)) = pending.pop_front() {
            if let Err(e) = self
                .scan_directory(&dir, depth, &mut files, &mut pending)
                .await
            {
                stats.errors += 1;
                if dir == path {
                    return Err(e);
                }
            }
        }

        files.sort();
        stats.files_found = files.len();
        Ok((files, stats))
    }

    async fn scan_directory(
        &self,
        dir: &Path,
        depth: usize,
        files: &mut Vec<PathBuf>,
        pending: &mut VecDeque<(PathBuf, usize)>,
    ) -> Result<()> {
        let traversal_error = |e: std::io::Error| Error::FileSystemTraversal {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        };

        let mut entries = fs::read_dir(dir).await.map_err(traversal_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(traversal_error)? {
            let entry_path = entry.path();
            if !self.follow_symlinks && entry_path.is_symlink() {
                continue;
            }

            let Ok(metadata) = fs::metadata(&entry_path).await else {
                continue;
            };
            if metadata.is_file() {
                if self.should_process(&entry_path) {
                    files.push(entry_path);
                }
            } else if metadata.is_dir() && self.max_depth.is_none_or(|max| depth < max) {
                pending.push_back((entry_path, depth + 1));
            }
        }
        Ok(())
    }

    /// Whether `path` passes the extension and glob filters
    pub fn should_process(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if !self.extensions.contains(&extension.to_lowercase()) {
            return false;
        }

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(path)
        {
            return false;
        }

        self.include_set
            .as_ref()
            .is_none_or(|include_set| include_set.is_match(path))
    }
}

fn build_glob_set(patterns: &[String], kind: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::Config(format!("Invalid glob pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|e| Error::Config(format!("Failed to build {} glob set: {}", kind, e)))
}
