//! JWalk-based media tree walker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jwalk::{Parallelism, WalkDir};
use tracing::{debug, warn};

use reelkeep_core::{LibraryConfig, LibraryError, MediaFilter, Result};

use crate::progress::WalkProgress;

/// A media file found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub abs_path: PathBuf,
    /// Path relative to the walk's base, forward-slash separated.
    pub rel_path: String,
    pub name: String,
    pub size_bytes: u64,
}

/// Everything a walk produced.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Media files in traversal order (sorted within each directory).
    pub files: Vec<WalkedFile>,
    /// Final progress counters.
    pub progress: WalkProgress,
}

/// Walks a subtree collecting recognized media files.
///
/// Hidden entries are skipped, and directories whose name matches an
/// excluded name (ignoring case) are pruned wherever they appear.
#[derive(Debug, Clone)]
pub struct MediaWalker {
    filter: MediaFilter,
    excluded_dirs: Arc<Vec<String>>,
    progress_every: u64,
}

impl MediaWalker {
    /// Create a walker with the given filter.
    pub fn new(filter: MediaFilter) -> Self {
        Self {
            filter,
            excluded_dirs: Arc::new(Vec::new()),
            progress_every: 50,
        }
    }

    /// Create a walker using the configured extensions.
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(MediaFilter::from_config(config)).with_progress_every(config.walk_progress_every)
    }

    /// Prune directories with these names.
    pub fn with_excluded_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_dirs = Arc::new(names.into_iter().map(|n| n.as_ref().to_lowercase()).collect());
        self
    }

    /// Report progress every `dirs` directories.
    pub fn with_progress_every(mut self, dirs: u64) -> Self {
        self.progress_every = dirs.max(1);
        self
    }

    /// Check whether a directory name is pruned.
    pub fn is_excluded(&self, name: &str) -> bool {
        is_excluded(&self.excluded_dirs, name)
    }

    /// Walk `root`, reporting paths relative to `base`.
    ///
    /// `base` must be `root` or one of its ancestors. `on_progress` is called
    /// every `progress_every` directories and once more at the end.
    pub fn walk(
        &self,
        root: &Path,
        base: &Path,
        mut on_progress: impl FnMut(&WalkProgress),
    ) -> Result<WalkOutcome> {
        if !root.is_dir() {
            return Err(LibraryError::not_found(root.display().to_string()));
        }

        let excluded = Arc::clone(&self.excluded_dirs);
        let walker = WalkDir::new(root)
            .parallelism(Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            })
            .skip_hidden(true)
            .follow_links(false)
            .sort(true)
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|entry| match entry {
                    Ok(e) => !(e.file_type().is_dir() && is_excluded(&excluded, &e.file_name().to_string_lossy())),
                    Err(_) => true,
                });
            });

        let mut outcome = WalkOutcome::default();
        let progress = &mut outcome.progress;

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    progress.errors_count += 1;
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                progress.dirs_visited += 1;
                progress.current_dir = entry.path();
                if progress.dirs_visited % self.progress_every == 0 {
                    on_progress(&*progress);
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            progress.files_seen += 1;
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.filter.is_media(&name) {
                continue;
            }

            let abs_path = entry.path();
            let Some(rel_path) = relative_slash_path(&abs_path, base) else {
                debug!(path = %abs_path.display(), "outside walk base");
                continue;
            };
            let size_bytes = match entry.metadata() {
                Ok(m) => m.len(),
                Err(err) => {
                    warn!(path = %abs_path.display(), error = %err, "metadata unavailable");
                    progress.errors_count += 1;
                    continue;
                }
            };

            progress.media_files += 1;
            outcome.files.push(WalkedFile {
                abs_path,
                rel_path,
                name,
                size_bytes,
            });
        }

        on_progress(&outcome.progress);
        Ok(outcome)
    }
}

fn is_excluded(excluded: &[String], name: &str) -> bool {
    !excluded.is_empty() && {
        let lower = name.to_lowercase();
        excluded.iter().any(|e| *e == lower)
    }
}

/// `path` relative to `base`, joined with forward slashes.
fn relative_slash_path(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("season/week1")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::create_dir_all(root.join("_Duplicates/nested")).unwrap();
        fs::create_dir_all(root.join("season/_duplicates")).unwrap();

        fs::write(root.join("intro.mp4"), "intro").unwrap();
        fs::write(root.join("notes.txt"), "not media").unwrap();
        fs::write(root.join(".hidden.mp4"), "hidden").unwrap();
        fs::write(root.join("season/week1/goal [fast].MKV"), "goal").unwrap();
        fs::write(root.join(".cache/cached.mp4"), "cached").unwrap();
        fs::write(root.join("_Duplicates/nested/old.mp4"), "old").unwrap();
        fs::write(root.join("season/_duplicates/older.mp4"), "older").unwrap();

        temp
    }

    #[test]
    fn test_walk_filters_media_and_hidden() {
        let temp = create_test_tree();
        let walker = MediaWalker::new(MediaFilter::default());
        let outcome = walker.walk(temp.path(), temp.path(), |_| {}).unwrap();

        let mut rels: Vec<_> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
        rels.sort();
        assert_eq!(
            rels,
            vec![
                "_Duplicates/nested/old.mp4",
                "intro.mp4",
                "season/_duplicates/older.mp4",
                "season/week1/goal [fast].MKV",
            ]
        );
        assert_eq!(outcome.progress.media_files, 4);
        assert!(outcome.progress.files_seen >= 5);
    }

    #[test]
    fn test_excluded_dirs_pruned_at_any_depth() {
        let temp = create_test_tree();
        let walker = MediaWalker::new(MediaFilter::default()).with_excluded_dirs(["_duplicates"]);
        let outcome = walker.walk(temp.path(), temp.path(), |_| {}).unwrap();

        let mut rels: Vec<_> = outcome.files.iter().map(|f| f.rel_path.clone()).collect();
        rels.sort();
        assert_eq!(rels, vec!["intro.mp4", "season/week1/goal [fast].MKV"]);
    }

    #[test]
    fn test_paths_relative_to_base() {
        let temp = create_test_tree();
        let walker = MediaWalker::new(MediaFilter::default());
        let outcome = walker
            .walk(&temp.path().join("season/week1"), temp.path(), |_| {})
            .unwrap();

        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].rel_path, "season/week1/goal [fast].MKV");
        assert_eq!(outcome.files[0].size_bytes, 4);
    }

    #[test]
    fn test_progress_reported_periodically() {
        let temp = create_test_tree();
        let walker = MediaWalker::new(MediaFilter::default()).with_progress_every(1);
        let mut calls = 0;
        let outcome = walker.walk(temp.path(), temp.path(), |_| calls += 1).unwrap();

        // one call per directory plus the final one
        assert_eq!(calls as u64, outcome.progress.dirs_visited + 1);
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let walker = MediaWalker::new(MediaFilter::default());
        let err = walker
            .walk(&temp.path().join("missing"), temp.path(), |_| {})
            .unwrap_err();
        assert_eq!(err.kind(), reelkeep_core::ErrorKind::NotFound);
    }
}
