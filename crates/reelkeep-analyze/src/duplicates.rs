//! Duplicate media detection using content hashing.
//!
//! Uses a two-phase algorithm:
//! 1. Group files by size (no I/O beyond the walk)
//! 2. Compute the full BLAKE3 hash of every file in a size bucket with two
//!    or more members, then sub-bucket by hash
//!
//! Files that share neither size nor hash are never read.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use derive_builder::Builder;
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing::{debug, info, warn};

use reelkeep_core::{ContentHash, LibraryConfig, MediaFilter, Result};
use reelkeep_scan::{MediaWalker, WalkProgress, WalkedFile};

use crate::fingerprint::fingerprint;

/// Configuration for duplicate detection.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct DuplicateConfig {
    /// Quarantine folder name, pruned at any depth (case-insensitive).
    #[builder(default = "\"_duplicates\".to_string()")]
    pub quarantine_dir: String,

    /// Which files count as media.
    #[builder(default)]
    pub filter: MediaFilter,

    /// Report walk progress every N directories.
    #[builder(default = "50")]
    pub walk_progress_every: u64,

    /// Report hash progress every N files.
    #[builder(default = "25")]
    pub hash_progress_every: u64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            quarantine_dir: "_duplicates".to_string(),
            filter: MediaFilter::default(),
            walk_progress_every: 50,
            hash_progress_every: 25,
        }
    }
}

impl DuplicateConfig {
    /// Create a new config builder.
    pub fn builder() -> DuplicateConfigBuilder {
        DuplicateConfigBuilder::default()
    }

    pub fn from_library(config: &LibraryConfig) -> Self {
        Self {
            quarantine_dir: config.quarantine_dir.clone(),
            filter: MediaFilter::from_config(config),
            walk_progress_every: config.walk_progress_every,
            hash_progress_every: config.hash_progress_every,
        }
    }
}

/// A set of byte-identical files with one chosen survivor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// `"<size>:<hash>"`, stable for a given content.
    pub group_id: String,
    /// Hex BLAKE3 digest shared by every member.
    pub hash: String,
    /// Size of each member in bytes.
    pub size_bytes: u64,
    /// Root-relative path of the survivor. Always one of `members`.
    pub keep: String,
    /// Root-relative paths, sorted ascending.
    pub members: Vec<String>,
}

impl DuplicateGroup {
    /// Build a group from its members, choosing the survivor.
    ///
    /// Returns `None` for fewer than two members.
    pub fn new(size_bytes: u64, hash: &ContentHash, mut members: Vec<String>) -> Option<Self> {
        if members.len() < 2 {
            return None;
        }
        members.sort();
        let keep = choose_keep(&members)?.clone();
        let hash = hash.to_hex();
        Some(Self {
            group_id: format!("{size_bytes}:{hash}"),
            hash,
            size_bytes,
            keep,
            members,
        })
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Members that would be quarantined.
    pub fn removable(&self) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .filter(|m| **m != self.keep)
            .map(String::as_str)
    }

    /// Space reclaimed by keeping only the survivor.
    pub fn wasted_bytes(&self) -> u64 {
        self.size_bytes * self.count().saturating_sub(1) as u64
    }
}

/// Pick the survivor: longest file name, then case-insensitive name, then
/// case-insensitive path.
pub fn choose_keep(members: &[String]) -> Option<&String> {
    members.iter().min_by(|a, b| keep_order(a, b))
}

fn keep_order(a: &str, b: &str) -> CmpOrdering {
    let (name_a, name_b) = (file_name(a), file_name(b));
    name_b
        .chars()
        .count()
        .cmp(&name_a.chars().count())
        .then_with(|| name_a.to_lowercase().cmp(&name_b.to_lowercase()))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Counters for the hashing phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashProgress {
    /// Files in size buckets with two or more members.
    pub candidate_files: u64,
    /// Candidates hashed so far (including failures).
    pub hashed_files: u64,
    /// Candidates that could not be read.
    pub hash_errors: u64,
}

/// Stage of a duplicate scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanPhase {
    Walking,
    Hashing,
    Grouping,
    Done,
}

/// Receives coarse progress from a running scan.
///
/// Called from rayon worker threads during hashing.
pub trait ScanObserver: Send + Sync {
    fn phase(&self, _phase: ScanPhase) {}
    fn walk_progress(&self, _progress: &WalkProgress) {}
    fn hash_progress(&self, _progress: &HashProgress) {}
    fn log(&self, _message: &str) {}
}

/// Observer that ignores everything.
impl ScanObserver for () {}

/// Results from a duplicate scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// Groups sorted by member count desc, size asc, hash asc.
    pub groups: Vec<DuplicateGroup>,
    pub dirs_visited: u64,
    pub files_seen: u64,
    pub media_files: u64,
    pub hash: HashProgress,
}

impl DuplicateReport {
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Files that belong to some group.
    pub fn duplicate_files(&self) -> u64 {
        self.groups.iter().map(|g| g.count() as u64).sum()
    }

    pub fn wasted_bytes(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_bytes).sum()
    }
}

/// Duplicate file finder.
#[derive(Debug, Clone, Default)]
pub struct DuplicateFinder {
    config: DuplicateConfig,
}

impl DuplicateFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DuplicateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DuplicateConfig {
        &self.config
    }

    /// Find byte-identical media files under `root`.
    ///
    /// Member paths are relative to `root`. Blocks the calling thread.
    pub fn find(&self, root: &Path, observer: &dyn ScanObserver) -> Result<DuplicateReport> {
        observer.phase(ScanPhase::Walking);
        observer.log(&format!("walking {}", root.display()));

        let walker = MediaWalker::new(self.config.filter.clone())
            .with_excluded_dirs([self.config.quarantine_dir.as_str()])
            .with_progress_every(self.config.walk_progress_every);
        let outcome = walker.walk(root, root, |p| observer.walk_progress(p))?;
        let walk = outcome.progress;
        observer.log(&format!(
            "walk finished: {} dirs, {} media files",
            walk.dirs_visited, walk.media_files
        ));

        let buckets = group_by_size(outcome.files);
        let candidates: Vec<WalkedFile> = buckets.into_values().flatten().collect();
        let mut hash = HashProgress {
            candidate_files: candidates.len() as u64,
            ..HashProgress::default()
        };

        observer.phase(ScanPhase::Hashing);
        observer.log(&format!("hashing {} candidates", hash.candidate_files));
        observer.hash_progress(&hash);

        let hashed = self.hash_candidates(candidates, &mut hash, observer);

        observer.phase(ScanPhase::Grouping);
        let groups = build_groups(hashed);

        info!(
            root = %root.display(),
            groups = groups.len(),
            candidates = hash.candidate_files,
            "duplicate scan finished"
        );
        observer.log(&format!("found {} duplicate groups", groups.len()));
        observer.phase(ScanPhase::Done);

        Ok(DuplicateReport {
            groups,
            dirs_visited: walk.dirs_visited,
            files_seen: walk.files_seen,
            media_files: walk.media_files,
            hash,
        })
    }

    /// Hash candidates in parallel, reporting every N files.
    fn hash_candidates(
        &self,
        candidates: Vec<WalkedFile>,
        hash: &mut HashProgress,
        observer: &dyn ScanObserver,
    ) -> Vec<(u64, ContentHash, String)> {
        let total = hash.candidate_files;
        let every = self.config.hash_progress_every.max(1);
        let done = AtomicU64::new(0);
        let failed = AtomicU64::new(0);

        let hashed: Vec<_> = candidates
            .into_par_iter()
            .filter_map(|file| {
                let result = fingerprint(&file.abs_path);
                if let Err(err) = &result {
                    warn!(path = %file.abs_path.display(), error = %err, "hash failed");
                    observer.log(&format!("skipped {}: {err}", file.rel_path));
                    failed.fetch_add(1, Ordering::Relaxed);
                }

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % every == 0 || n == total {
                    debug!(hashed = n, total, "hash progress");
                    observer.hash_progress(&HashProgress {
                        candidate_files: total,
                        hashed_files: n,
                        hash_errors: failed.load(Ordering::Relaxed),
                    });
                }

                result.ok().map(|h| (file.size_bytes, h, file.rel_path))
            })
            .collect();

        hash.hashed_files = done.into_inner();
        hash.hash_errors = failed.into_inner();
        hashed
    }
}

/// Bucket files by size, keeping buckets with two or more members.
fn group_by_size(files: Vec<WalkedFile>) -> HashMap<u64, Vec<WalkedFile>> {
    let mut buckets: HashMap<u64, Vec<WalkedFile>> = HashMap::new();
    for file in files {
        buckets.entry(file.size_bytes).or_default().push(file);
    }
    buckets.retain(|_, v| v.len() > 1);
    buckets
}

fn build_groups(hashed: Vec<(u64, ContentHash, String)>) -> Vec<DuplicateGroup> {
    hashed
        .into_iter()
        .map(|(size, hash, path)| ((size, hash), path))
        .into_group_map()
        .into_iter()
        .filter_map(|((size, hash), members)| DuplicateGroup::new(size, &hash, members))
        .sorted_by(|a, b| {
            b.count()
                .cmp(&a.count())
                .then(a.size_bytes.cmp(&b.size_bytes))
                .then_with(|| a.hash.cmp(&b.hash))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn members(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_keep_prefers_longest_name() {
        let m = members(&["a.mp4", "ab.mp4"]);
        assert_eq!(choose_keep(&m).unwrap(), "ab.mp4");
    }

    #[test]
    fn test_keep_ties_break_on_name_then_path() {
        let m = members(&["b.mp4", "a.mp4"]);
        assert_eq!(choose_keep(&m).unwrap(), "a.mp4");

        let m = members(&["Z/A.mp4", "y/a.mp4"]);
        assert_eq!(choose_keep(&m).unwrap(), "y/a.mp4");

        // directory depth does not make a name longer
        let m = members(&["deep/nested/x.mp4", "xy.mp4"]);
        assert_eq!(choose_keep(&m).unwrap(), "xy.mp4");
    }

    #[test]
    fn test_group_rejects_singletons() {
        let hash = ContentHash::new([1; 32]);
        assert!(DuplicateGroup::new(10, &hash, members(&["a.mp4"])).is_none());

        let group = DuplicateGroup::new(10, &hash, members(&["b.mp4", "a.mp4"])).unwrap();
        assert_eq!(group.members, ["a.mp4", "b.mp4"]);
        assert_eq!(group.group_id, format!("10:{}", hash.to_hex()));
        assert_eq!(group.removable().collect::<Vec<_>>(), ["b.mp4"]);
        assert_eq!(group.wasted_bytes(), 10);
    }

    #[test]
    fn test_group_ordering() {
        let groups = build_groups(vec![
            (5, ContentHash::new([2; 32]), "x1.mp4".into()),
            (5, ContentHash::new([2; 32]), "x2.mp4".into()),
            (3, ContentHash::new([9; 32]), "y1.mp4".into()),
            (3, ContentHash::new([9; 32]), "y2.mp4".into()),
            (5, ContentHash::new([1; 32]), "z1.mp4".into()),
            (5, ContentHash::new([1; 32]), "z2.mp4".into()),
            (5, ContentHash::new([1; 32]), "z3.mp4".into()),
            (7, ContentHash::new([4; 32]), "lonely.mp4".into()),
        ]);

        let keeps: Vec<_> = groups.iter().map(|g| g.keep.as_str()).collect();
        assert_eq!(keeps, ["z1.mp4", "y1.mp4", "x1.mp4"]);
    }

    #[derive(Default)]
    struct Recorder {
        phases: Mutex<Vec<ScanPhase>>,
        last_hash: Mutex<Option<HashProgress>>,
    }

    impl ScanObserver for Recorder {
        fn phase(&self, phase: ScanPhase) {
            self.phases.lock().unwrap().push(phase);
        }

        fn hash_progress(&self, progress: &HashProgress) {
            *self.last_hash.lock().unwrap() = Some(progress.clone());
        }
    }

    #[test]
    fn test_find_reports_phases_and_progress() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("one.mp4"), "twin").unwrap();
        fs::write(temp.path().join("two.mp4"), "twin").unwrap();
        fs::write(temp.path().join("odd.mp4"), "solo!").unwrap();

        let recorder = Recorder::default();
        let report = DuplicateFinder::new().find(temp.path(), &recorder).unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.media_files, 3);
        assert_eq!(
            *recorder.phases.lock().unwrap(),
            [
                ScanPhase::Walking,
                ScanPhase::Hashing,
                ScanPhase::Grouping,
                ScanPhase::Done
            ]
        );
        let last = recorder.last_hash.lock().unwrap().clone().unwrap();
        assert_eq!(last.candidate_files, 2);
        assert_eq!(last.hashed_files, 2);
    }
}
