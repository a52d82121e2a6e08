//! Media tree walking and the tag index for reelkeep.
//!
//! `reelkeep-scan` is responsible for traversing the media tree and keeping
//! a cached, searchable view of the tags embedded in file names. Key
//! features:
//!
//! - **Parallel traversal** via jwalk/rayon
//! - **Pruning** of hidden entries and excluded folders at any depth
//! - **Coarse progress** reported every N directories
//! - **Stale-while-revalidate** tag index with single-flight rebuilds
//!
//! # Example
//!
//! ```rust,no_run
//! use reelkeep_core::LibraryConfig;
//! use reelkeep_scan::{MatchMode, TagIndex};
//!
//! let config = LibraryConfig::new("/srv/media");
//! let index = TagIndex::from_config(&config);
//! let snapshot = index.get(false).unwrap();
//!
//! for entry in reelkeep_scan::search_tags(&snapshot, "goal fast", MatchMode::All, 50) {
//!     println!("{} {:?}", entry.path, entry.tags);
//! }
//! ```

mod progress;
mod search;
mod tag_index;
mod walker;

pub use progress::WalkProgress;
pub use search::{MatchMode, TagCount, search_names, search_tags, tag_counts};
pub use tag_index::{TagIndex, TagIndexStatus};
pub use walker::{MediaWalker, WalkOutcome, WalkedFile};

// Re-export core types for convenience
pub use reelkeep_core::{LibraryError, MediaEntry, MediaFilter, TagIndexSnapshot, TagSet};
