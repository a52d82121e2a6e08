//! Duplicate scan jobs and the quarantine move.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use reelkeep_analyze::{
    DuplicateConfig, DuplicateFinder, DuplicateGroup, HashProgress, ScanObserver, ScanPhase,
    WalkProgress,
};
use reelkeep_core::{
    ErrorKind, LibraryConfig, LibraryError, Result, join_relpath, safe_path, unique_file_name,
};
use reelkeep_jobs::{
    JobId, JobRecord, JobStatus, JobStore, LogRing, current_runtime, spawn_blocking_job,
};
use reelkeep_scan::TagIndex;

/// Log lines returned by a status poll.
pub const STATUS_LOG_LINES: usize = 60;

/// Scan counters, each only ever growing while the scan runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounters {
    pub dirs_visited: u64,
    pub files_seen: u64,
    pub candidate_files: u64,
    pub hashed_files: u64,
    pub duplicate_groups: u64,
    pub duplicate_files: u64,
}

/// A duplicate scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub scan_id: JobId,
    /// Root-relative scan root ("" for the media root).
    pub root: String,
    pub root_abs: PathBuf,
    pub status: JobStatus,
    pub phase: String,
    pub progress: ScanCounters,
    /// Populated once `status = done`.
    pub groups: Vec<DuplicateGroup>,
    pub log: LogRing,
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
}

impl JobRecord for ScanJob {
    fn id(&self) -> JobId {
        self.scan_id
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn fail(&mut self, error: &LibraryError) {
        let message = error.to_string();
        self.log.push(format!("error: {message}"));
        self.status = JobStatus::Error;
        self.phase = "error".to_string();
        self.error = Some(message);
        self.error_kind = Some(error.kind());
    }
}

/// What a poller sees of a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStatus {
    pub scan_id: JobId,
    pub root: String,
    pub status: JobStatus,
    pub phase: String,
    pub progress: ScanCounters,
    pub log: Vec<String>,
    /// Only present once the scan is done.
    pub groups: Option<Vec<DuplicateGroup>>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl From<&ScanJob> for ScanStatus {
    fn from(job: &ScanJob) -> Self {
        Self {
            scan_id: job.scan_id,
            root: job.root.clone(),
            status: job.status,
            phase: job.phase.clone(),
            progress: job.progress.clone(),
            log: job.log.tail(STATUS_LOG_LINES),
            groups: (job.status == JobStatus::Done).then(|| job.groups.clone()),
            error: job.error.clone(),
            error_kind: job.error_kind,
        }
    }
}

/// One file moved into quarantine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedFile {
    pub group_id: String,
    /// Scan-root-relative source.
    pub from: String,
    /// Scan-root-relative destination inside the quarantine folder.
    pub to: String,
}

/// Result of a quarantine move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineOutcome {
    pub moved: Vec<MovedFile>,
    /// Members that could not be moved.
    pub skipped: Vec<String>,
}

/// Duplicate scan service.
#[derive(Debug, Clone)]
pub struct DuplicateScans {
    media_root: PathBuf,
    finder: DuplicateFinder,
    log_capacity: usize,
    store: Arc<JobStore<ScanJob>>,
    tag_index: TagIndex,
}

impl DuplicateScans {
    pub fn new(
        media_root: impl Into<PathBuf>,
        config: DuplicateConfig,
        store: JobStore<ScanJob>,
        tag_index: TagIndex,
    ) -> Self {
        Self {
            media_root: media_root.into(),
            finder: DuplicateFinder::with_config(config),
            log_capacity: reelkeep_jobs::DEFAULT_LOG_CAPACITY,
            store: Arc::new(store),
            tag_index,
        }
    }

    pub fn from_config(config: &LibraryConfig, tag_index: TagIndex) -> Self {
        let mut scans = Self::new(
            &config.media_root,
            DuplicateConfig::from_library(config),
            JobStore::new().with_max_retained(config.max_retained_jobs),
            tag_index,
        );
        scans.log_capacity = config.log_capacity;
        scans
    }

    pub fn store(&self) -> &JobStore<ScanJob> {
        &self.store
    }

    /// Start scanning `relpath` under the media root.
    ///
    /// Path errors, and a missing tokio runtime, are returned before any job
    /// exists.
    pub fn start(&self, relpath: &str) -> Result<JobId> {
        let (root_abs, root) = safe_path(&self.media_root, relpath)?;
        if !root_abs.is_dir() {
            return Err(LibraryError::not_found(format!("directory {root:?}")));
        }
        let runtime = current_runtime()?;

        let capacity = self.log_capacity;
        let id = self.store.create(|scan_id| ScanJob {
            scan_id,
            root: root.clone(),
            root_abs: root_abs.clone(),
            status: JobStatus::Running,
            phase: "queued".to_string(),
            progress: ScanCounters::default(),
            groups: Vec::new(),
            log: LogRing::new(capacity),
            error: None,
            error_kind: None,
        });
        info!(scan = %id, root = %root_abs.display(), "duplicate scan started");

        let finder = self.finder.clone();
        let store = Arc::clone(&self.store);
        spawn_blocking_job(&runtime, Arc::clone(&self.store), id, move || {
            let observer = JobObserver {
                store: Arc::clone(&store),
                id,
            };
            let report = finder.find(&root_abs, &observer)?;
            let duplicate_files = report.duplicate_files();
            store.update(id, |job| {
                job.progress.dirs_visited = report.dirs_visited;
                job.progress.files_seen = report.files_seen;
                job.progress.candidate_files = report.hash.candidate_files;
                job.progress.hashed_files = report.hash.hashed_files;
                job.progress.duplicate_groups = report.groups.len() as u64;
                job.progress.duplicate_files = duplicate_files;
                job.groups = report.groups;
                job.phase = "done".to_string();
                job.status = JobStatus::Done;
            });
            Ok(())
        });
        Ok(id)
    }

    /// Current state of a scan.
    pub fn status(&self, id: JobId) -> Result<ScanStatus> {
        self.store
            .get(id)
            .map(|job| ScanStatus::from(&job))
            .ok_or_else(|| LibraryError::not_found(format!("scan {id}")))
    }

    /// Move every non-kept member of one group (or of all groups) into the
    /// quarantine folder at the scan root.
    ///
    /// Files that cannot be moved are skipped. Touched groups are reduced to
    /// their survivor and a tag-index rebuild is started.
    pub fn quarantine(&self, id: JobId, group_id: Option<&str>) -> Result<QuarantineOutcome> {
        let job = self
            .store
            .get(id)
            .ok_or_else(|| LibraryError::not_found(format!("scan {id}")))?;
        if job.status != JobStatus::Done {
            return Err(LibraryError::invalid_input(format!(
                "scan {id} is {}",
                job.status
            )));
        }

        let groups: Vec<&DuplicateGroup> = match group_id {
            Some(gid) => vec![
                job.groups
                    .iter()
                    .find(|g| g.group_id == gid)
                    .ok_or_else(|| LibraryError::not_found(format!("group {gid}")))?,
            ],
            None => job.groups.iter().collect(),
        };

        let quarantine_name = self.finder.config().quarantine_dir.clone();
        let quarantine_dir = job.root_abs.join(&quarantine_name);
        let mut outcome = QuarantineOutcome::default();

        if groups.iter().any(|g| g.removable().next().is_some()) {
            fs::create_dir_all(&quarantine_dir).map_err(|e| LibraryError::io(&quarantine_dir, e))?;
        }

        for group in &groups {
            for member in group.removable() {
                match move_into(&job.root_abs, member, &quarantine_dir) {
                    Ok(name) => outcome.moved.push(MovedFile {
                        group_id: group.group_id.clone(),
                        from: member.to_string(),
                        to: join_relpath(&quarantine_name, &name),
                    }),
                    Err(err) => {
                        warn!(scan = %id, file = member, error = %err, "quarantine move skipped");
                        outcome.skipped.push(member.to_string());
                    }
                }
            }
        }

        let touched: Vec<String> = groups.iter().map(|g| g.group_id.clone()).collect();
        let moved = outcome.moved.len();
        self.store.update(id, |job| {
            for group in job.groups.iter_mut().filter(|g| touched.contains(&g.group_id)) {
                group.members = vec![group.keep.clone()];
            }
            job.log.push(format!(
                "quarantined {moved} files from {} groups",
                touched.len()
            ));
        });

        if moved > 0 {
            self.tag_index.trigger_rebuild();
        }
        info!(scan = %id, moved, skipped = outcome.skipped.len(), "quarantine finished");
        Ok(outcome)
    }
}

/// Move `member` (relative to `root`) into `dir` under a free name.
fn move_into(root: &Path, member: &str, dir: &Path) -> Result<String> {
    let (src, rel) = safe_path(root, member)?;
    if !src.is_file() {
        return Err(LibraryError::not_found(rel));
    }
    let file_name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LibraryError::invalid_path(member))?;

    let name = unique_file_name(dir, &file_name);
    move_file(&src, &dir.join(&name))?;
    Ok(name)
}

/// Rename `src` to `dest`, copying then deleting when a rename is not
/// possible (rename fails across filesystems).
pub(crate) fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    let options = fs_extra::file::CopyOptions::new();
    fs_extra::file::move_file(src, dest, &options)
        .map_err(|e| LibraryError::io(src, std::io::Error::other(e.to_string())))?;
    Ok(())
}

/// Feeds scan progress into the job record.
struct JobObserver {
    store: Arc<JobStore<ScanJob>>,
    id: JobId,
}

impl ScanObserver for JobObserver {
    fn phase(&self, phase: ScanPhase) {
        self.store.update(self.id, |job| {
            job.phase = phase.to_string();
            job.log.push(format!("phase: {phase}"));
        });
    }

    fn walk_progress(&self, progress: &WalkProgress) {
        self.store.update(self.id, |job| {
            job.progress.dirs_visited = job.progress.dirs_visited.max(progress.dirs_visited);
            job.progress.files_seen = job.progress.files_seen.max(progress.files_seen);
        });
    }

    fn hash_progress(&self, progress: &HashProgress) {
        self.store.update(self.id, |job| {
            job.progress.candidate_files = progress.candidate_files;
            job.progress.hashed_files = job.progress.hashed_files.max(progress.hashed_files);
        });
    }

    fn log(&self, message: &str) {
        self.store.update(self.id, |job| job.log.push(message));
    }
}
