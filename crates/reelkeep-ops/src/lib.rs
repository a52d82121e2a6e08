//! Library operations for reelkeep.
//!
//! This crate provides the services that act on a media library:
//!
//! - **Duplicate scans** - background scan jobs and the quarantine move
//! - **Merges** - concatenating files through the external encoder with
//!   pollable, checkpointed progress
//! - **Clips** - cutting segments out of a file with stream copy
//! - **Export** - copying the queue out in order
//! - **Retag** - renaming files to add or remove tags
//!
//! All of them are reachable through [`Library`], built once per process
//! from a [`LibraryConfig`](reelkeep_core::LibraryConfig).

mod clips;
mod export;
mod library;
pub mod merge;
mod queue;
mod retag;
mod scans;

pub use clips::{
    ClipOutcome, ClipSegment, CreatedClip, MAX_SEGMENTS, MIN_CLIP_SECS, cut_clips, next_clip_name,
    validate_segments,
};
pub use export::{ExportOutcome, ExportedFile, SkippedFile, export, prefix_width};
pub use library::Library;
pub use merge::{MergeJob, MergeJobs, MergeProfile, MergeStatus, ToolLocator};
pub use queue::{OrderedQueue, QueueItem, QueueSource, TransferMode};
pub use retag::{RetagOutcome, TagAction, retag};
pub use scans::{
    DuplicateScans, MovedFile, QuarantineOutcome, STATUS_LOG_LINES, ScanCounters, ScanJob,
    ScanStatus,
};
