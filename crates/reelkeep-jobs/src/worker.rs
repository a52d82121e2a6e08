//! Spawning job workers that always leave their job finished.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use reelkeep_core::{LibraryError, Result};

use crate::id::JobId;
use crate::record::{JobRecord, JobStatus};
use crate::store::JobStore;

/// Handle of the runtime the caller is on, or `NoRuntime`.
///
/// Services check this before creating a job so that a missing runtime is a
/// request error rather than a job stuck in `running`.
pub fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|_| LibraryError::NoRuntime)
}

/// Run blocking `work` for job `id` on the runtime's blocking pool.
///
/// `work` marks the job done itself. If it returns an error, panics, or
/// returns while the job is still running, the job is failed.
pub fn spawn_blocking_job<J, F>(
    runtime: &Handle,
    store: Arc<JobStore<J>>,
    id: JobId,
    work: F,
) -> JoinHandle<()>
where
    J: JobRecord,
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let task = runtime.spawn_blocking(work);
    runtime.spawn(supervise(store, id, task))
}

/// Run async `work` for job `id` as its own task, with the same guarantees as
/// [`spawn_blocking_job`].
pub fn spawn_job<J, Fut>(runtime: &Handle, store: Arc<JobStore<J>>, id: JobId, work: Fut) -> JoinHandle<()>
where
    J: JobRecord,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let task = runtime.spawn(work);
    runtime.spawn(supervise(store, id, task))
}

async fn supervise<J: JobRecord>(
    store: Arc<JobStore<J>>,
    id: JobId,
    task: JoinHandle<Result<()>>,
) {
    let failure = match task.await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(join) => Some(join_failure(join)),
    };

    store.update(id, |job| match failure {
        Some(err) => {
            error!(job = %id, kind = %err.kind(), error = %err, "job failed");
            job.fail(&err);
        }
        None if job.status() == JobStatus::Running => {
            error!(job = %id, "worker returned without finishing its job");
            job.fail(&LibraryError::interrupted("worker exited before the job finished"));
        }
        None => info!(job = %id, status = %job.status(), "job finished"),
    });
}

fn join_failure(join: JoinError) -> LibraryError {
    if join.is_cancelled() {
        return LibraryError::interrupted("worker was cancelled");
    }
    LibraryError::WorkerPanicked {
        message: panic_message(join.into_panic()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
