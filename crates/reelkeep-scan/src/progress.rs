//! Walk progress reporting.

use std::path::PathBuf;

/// Progress information during a walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkProgress {
    /// Directories entered so far.
    pub dirs_visited: u64,
    /// Regular files seen so far (media or not).
    pub files_seen: u64,
    /// Files that passed the media filter.
    pub media_files: u64,
    /// Number of unreadable entries skipped.
    pub errors_count: u64,
    /// Directory most recently entered.
    pub current_dir: PathBuf,
}

impl WalkProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total items visited (files + dirs).
    pub fn total_items(&self) -> u64 {
        self.files_seen + self.dirs_visited
    }
}
