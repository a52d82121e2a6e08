//! Duplicate detection for reelkeep.
//!
//! This crate finds byte-identical media files under a scan root:
//!
//! - **Content fingerprints** - whole-file BLAKE3 digests
//! - **Duplicate detection** - size buckets, then hash sub-buckets, with one
//!   deterministic survivor per group
//!
//! # Duplicate Detection
//!
//! ```rust,ignore
//! use reelkeep_analyze::{DuplicateConfig, DuplicateFinder};
//!
//! let finder = DuplicateFinder::with_config(DuplicateConfig::default());
//! let report = finder.find("/srv/media".as_ref(), &()).unwrap();
//!
//! for group in &report.groups {
//!     println!("{} keep {} ({} copies)", group.group_id, group.keep, group.count());
//! }
//! ```

mod duplicates;
pub mod fingerprint;

pub use duplicates::{
    DuplicateConfig, DuplicateConfigBuilder, DuplicateFinder, DuplicateGroup, DuplicateReport,
    HashProgress, ScanObserver, ScanPhase, choose_keep,
};
pub use fingerprint::fingerprint;

// Re-export core types
pub use reelkeep_core::ContentHash;
pub use reelkeep_scan::WalkProgress;
