//! Service container wiring the library's services together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use reelkeep_core::{ErrorKind, LibraryConfig, LibraryError, MediaFilter, Result, safe_path};
use reelkeep_jobs::JobId;
use reelkeep_scan::TagIndex;

use crate::clips::{ClipOutcome, ClipSegment, cut_clips};
use crate::export::{ExportOutcome, export};
use crate::merge::{MergeJobs, MergeProfile, ToolLocator};
use crate::queue::{OrderedQueue, QueueItem, QueueSource, TransferMode};
use crate::retag::{RetagOutcome, TagAction, retag};
use crate::scans::DuplicateScans;

/// Every service of one media library, built once and shared.
///
/// Each service owns its own lock; none is held while calling another.
#[derive(Debug, Clone)]
pub struct Library {
    config: Arc<LibraryConfig>,
    filter: MediaFilter,
    locator: ToolLocator,
    tags: TagIndex,
    scans: DuplicateScans,
    merges: MergeJobs,
}

impl Library {
    pub fn new(config: LibraryConfig) -> Self {
        let tags = TagIndex::from_config(&config);
        let scans = DuplicateScans::from_config(&config, tags.clone());
        let merges = MergeJobs::from_config(&config);
        Self {
            filter: MediaFilter::from_config(&config),
            locator: ToolLocator::from_config(&config),
            config: Arc::new(config),
            tags,
            scans,
            merges,
        }
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn media_root(&self) -> &Path {
        &self.config.media_root
    }

    /// Root holding queued files.
    pub fn target_root(&self) -> PathBuf {
        self.config.target_root()
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    pub fn scans(&self) -> &DuplicateScans {
        &self.scans
    }

    pub fn merges(&self) -> &MergeJobs {
        &self.merges
    }

    /// Add or remove a tag, then refresh the tag index in the background.
    pub fn retag(&self, relpath: &str, action: TagAction, tag: &str) -> Result<RetagOutcome> {
        let outcome = retag(self.media_root(), relpath, action, tag)?;
        if outcome.changed {
            self.rebuild_tags();
        }
        Ok(outcome)
    }

    /// Cut segments of a media-root file into clips beside it, then refresh
    /// the tag index.
    pub async fn cut_clips(&self, relpath: &str, segments: &[ClipSegment]) -> Result<ClipOutcome> {
        let result = cut_clips(&self.locator, self.media_root(), &self.filter, relpath, segments).await;
        let wrote_files = match &result {
            Ok(outcome) => !outcome.created.is_empty(),
            // earlier segments may already be on disk
            Err(err) => err.kind() == ErrorKind::ToolFailed,
        };
        if wrote_files {
            self.rebuild_tags();
        }
        result
    }

    /// Queue a media file that already exists under the target root.
    pub fn enqueue(&self, queue: &mut OrderedQueue, target: &str) -> Result<(QueueItem, bool)> {
        let (abs, rel) = safe_path(&self.target_root(), target)?;
        if !self.filter.is_media(&rel) {
            return Err(LibraryError::invalid_input(format!("not a media file: {rel}")));
        }
        if !abs.is_file() {
            return Err(LibraryError::not_found(rel));
        }
        queue.add(&self.filter, &rel, None)
    }

    /// Copy or move a media-root file into the target root and queue it.
    pub fn transfer(
        &self,
        queue: &mut OrderedQueue,
        source: &str,
        target_subdir: &str,
        mode: TransferMode,
    ) -> Result<QueueItem> {
        let item = queue.transfer(
            self.media_root(),
            &self.target_root(),
            &self.filter,
            source,
            target_subdir,
            mode,
        )?;
        self.rebuild_tags();
        Ok(item)
    }

    /// Export the queue from the target root into the export root.
    pub fn export(
        &self,
        queue: &dyn QueueSource,
        destination_subdir: &str,
        clear_destination: bool,
    ) -> Result<ExportOutcome> {
        export(
            &self.target_root(),
            &self.config.export_root(),
            queue,
            destination_subdir,
            clear_destination,
        )
    }

    /// Start merging the queue's target-root files in order.
    pub fn merge_queue(&self, queue: &dyn QueueSource, profile: MergeProfile) -> Result<JobId> {
        self.merges.start(&queue.target_paths(), profile)
    }

    fn rebuild_tags(&self) {
        if !self.tags.trigger_rebuild() {
            debug!("tag index rebuild already running");
        }
    }
}
