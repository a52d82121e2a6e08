//! Job engine for reelkeep.
//!
//! Long-running work (duplicate scans, merges) runs as a job: a record in a
//! [`JobStore`] that its single worker mutates and any number of callers
//! poll. Records are checkpointed to disk on every change so a restarted
//! process can still answer for them.
//!
//! ```rust,ignore
//! let store = Arc::new(JobStore::<MyJob>::new().with_checkpoints(CheckpointDir::new(dir)));
//! let id = store.create(MyJob::new);
//! let runtime = current_runtime()?;
//! spawn_blocking_job(&runtime, Arc::clone(&store), id, move || do_work(id));
//! let snapshot = store.load_or_get(id);
//! ```

mod checkpoint;
mod id;
mod log;
mod record;
mod store;
mod worker;

pub use checkpoint::CheckpointDir;
pub use id::JobId;
pub use log::{DEFAULT_LOG_CAPACITY, LogLine, LogRing};
pub use record::{JobRecord, JobStatus};
pub use store::{DEFAULT_MAX_RETAINED, JobStore};
pub use worker::{current_runtime, spawn_blocking_job, spawn_job};
