//! Lock-guarded job table with write-through checkpoints.

use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::{debug, warn};

use reelkeep_core::LibraryError;

use crate::checkpoint::CheckpointDir;
use crate::id::JobId;
use crate::record::JobRecord;

/// Default number of finished jobs kept in memory.
pub const DEFAULT_MAX_RETAINED: usize = 256;

/// Table of jobs of one kind.
///
/// Every read and write goes through one lock, and checkpoints are written
/// while it is held, so a checkpoint never mixes two updates. Jobs are kept
/// in insertion order; once more than `max_retained` are stored the oldest
/// finished ones are dropped from memory (their checkpoints stay on disk).
#[derive(Debug)]
pub struct JobStore<J> {
    jobs: Mutex<IndexMap<JobId, J>>,
    checkpoints: Option<CheckpointDir>,
    max_retained: usize,
}

impl<J: JobRecord> JobStore<J> {
    /// In-memory store.
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(IndexMap::new()),
            checkpoints: None,
            max_retained: DEFAULT_MAX_RETAINED,
        }
    }

    /// Persist every mutation under `dir`.
    pub fn with_checkpoints(mut self, dir: CheckpointDir) -> Self {
        self.checkpoints = Some(dir);
        self
    }

    pub fn with_max_retained(mut self, max: usize) -> Self {
        self.max_retained = max.max(1);
        self
    }

    pub fn checkpoints(&self) -> Option<&CheckpointDir> {
        self.checkpoints.as_ref()
    }

    /// Store a new record built from a fresh id and return the id.
    pub fn create(&self, init: impl FnOnce(JobId) -> J) -> JobId {
        let id = JobId::new();
        let record = init(id);
        let mut jobs = self.lock();
        self.persist(id, &record);
        jobs.insert(id, record);
        self.evict(&mut jobs);
        debug!(job = %id, "job created");
        id
    }

    /// Apply `f` to the record of `id` and checkpoint it.
    ///
    /// Returns `false` without doing anything if the job is not in memory.
    pub fn update(&self, id: JobId, f: impl FnOnce(&mut J)) -> bool {
        let mut jobs = self.lock();
        let Some(record) = jobs.get_mut(&id) else {
            return false;
        };
        f(record);
        self.persist(id, record);
        true
    }

    /// Snapshot of the in-memory record.
    pub fn get(&self, id: JobId) -> Option<J> {
        self.lock().get(&id).cloned()
    }

    /// Snapshot of the record, falling back to its checkpoint.
    ///
    /// A record found only on disk (after a restart, or after eviction) is
    /// put back into memory. Running jobs are never evicted, so a restored
    /// record that is still running lost its worker; it is failed as
    /// interrupted and checkpointed again.
    pub fn load_or_get(&self, id: JobId) -> Option<J> {
        let mut jobs = self.lock();
        if let Some(record) = jobs.get(&id) {
            return Some(record.clone());
        }

        let mut record: J = self.checkpoints.as_ref()?.load(id)?;
        if !record.is_finished() {
            warn!(job = %id, "restored job was still running; marking it interrupted");
            record.fail(&LibraryError::interrupted("process restarted before the job finished"));
            self.persist(id, &record);
        }
        debug!(job = %id, "job restored from checkpoint");
        jobs.insert(id, record.clone());
        self.evict(&mut jobs);
        Some(record)
    }

    /// Snapshots of all in-memory records, oldest first.
    pub fn list(&self) -> Vec<J> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<JobId, J>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, id: JobId, record: &J) {
        if let Some(dir) = &self.checkpoints {
            if let Err(err) = dir.save(id, record) {
                warn!(job = %id, error = %err, "checkpoint failed");
            }
        }
    }

    fn evict(&self, jobs: &mut IndexMap<JobId, J>) {
        while jobs.len() > self.max_retained {
            let Some(oldest) = jobs.values().position(|j| j.is_finished()) else {
                break;
            };
            if let Some((id, _)) = jobs.shift_remove_index(oldest) {
                debug!(job = %id, "finished job evicted from memory");
            }
        }
    }
}

impl<J: JobRecord> Default for JobStore<J> {
    fn default() -> Self {
        Self::new()
    }
}
