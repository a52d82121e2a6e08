//! Merging an ordered list of media files through the external encoder.

mod concat;
mod profile;
mod progress;
mod tool;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, info, warn};

use reelkeep_core::{ErrorKind, LibraryConfig, LibraryError, Result, safe_path};
use reelkeep_jobs::{
    CheckpointDir, JobId, JobRecord, JobStatus, JobStore, current_runtime, spawn_job,
};

pub use concat::{ConcatList, escape_concat_path};
pub use profile::MergeProfile;
pub use progress::{DIAGNOSTIC_LINES, DiagnosticTail, ProgressLine, ProgressTracker, parse_line};
pub use tool::{FFMPEG, FFPROBE, ToolLocator, probe_duration, total_duration};

/// A merge job as polled and checkpointed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeJob {
    pub job_id: JobId,
    pub status: JobStatus,
    pub phase: String,
    pub message: String,
    /// 0..=99 while running, 100 only together with `status = done`.
    pub progress_pct: u8,
    pub profile: MergeProfile,
    /// Root-relative inputs in merge order.
    pub inputs: Vec<String>,
    /// Set only once the output is confirmed on disk.
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
}

impl MergeJob {
    fn new(job_id: JobId, profile: MergeProfile, inputs: Vec<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::Running,
            phase: "queued".to_string(),
            message: format!("{} inputs", inputs.len()),
            progress_pct: 0,
            profile,
            inputs,
            output_path: None,
            error: None,
            error_kind: None,
        }
    }
}

impl JobRecord for MergeJob {
    fn id(&self) -> JobId {
        self.job_id
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn fail(&mut self, error: &LibraryError) {
        let message = error.to_string();
        self.status = JobStatus::Error;
        self.phase = "error".to_string();
        self.message = message.lines().next().unwrap_or_default().to_string();
        self.error = Some(message);
        self.error_kind = Some(error.kind());
    }
}

/// What a poller sees of a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStatus {
    pub job_id: JobId,
    pub status: JobStatus,
    pub phase: String,
    pub message: String,
    pub progress_pct: u8,
    pub download_ready: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl From<&MergeJob> for MergeStatus {
    fn from(job: &MergeJob) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            phase: job.phase.clone(),
            message: job.message.clone(),
            progress_pct: job.progress_pct,
            download_ready: job.status == JobStatus::Done
                && job.output_path.as_deref().is_some_and(Path::is_file),
            error: job.error.clone(),
            error_kind: job.error_kind,
        }
    }
}

/// Merge job service.
#[derive(Debug, Clone)]
pub struct MergeJobs {
    inner: Arc<MergeContext>,
}

#[derive(Debug)]
struct MergeContext {
    /// Inputs are relative to this root.
    input_root: PathBuf,
    output_dir: PathBuf,
    locator: ToolLocator,
    store: Arc<JobStore<MergeJob>>,
}

impl MergeJobs {
    pub fn new(
        input_root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        locator: ToolLocator,
        store: JobStore<MergeJob>,
    ) -> Self {
        Self {
            inner: Arc::new(MergeContext {
                input_root: input_root.into(),
                output_dir: output_dir.into(),
                locator,
                store: Arc::new(store),
            }),
        }
    }

    /// Checkpointed service merging files from the target root, where the
    /// queue's files live.
    pub fn from_config(config: &LibraryConfig) -> Self {
        let store = JobStore::new()
            .with_checkpoints(CheckpointDir::new(config.jobs_dir("merge")))
            .with_max_retained(config.max_retained_jobs);
        Self::new(
            config.target_root(),
            config.merges_dir(),
            ToolLocator::from_config(config),
            store,
        )
    }

    pub fn store(&self) -> &JobStore<MergeJob> {
        &self.inner.store
    }

    /// Validate inputs and start merging them in order.
    ///
    /// Bad paths, missing files and a missing tokio runtime are rejected
    /// before a job exists. Tool problems surface as a failed job.
    pub fn start(&self, inputs: &[String], profile: MergeProfile) -> Result<JobId> {
        if inputs.is_empty() {
            return Err(LibraryError::empty("no files to merge"));
        }

        let mut abs_inputs = Vec::with_capacity(inputs.len());
        let mut rel_inputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let (abs, rel) = safe_path(&self.inner.input_root, input)?;
            if !abs.is_file() {
                return Err(LibraryError::not_found(rel));
            }
            abs_inputs.push(abs);
            rel_inputs.push(rel);
        }
        let runtime = current_runtime()?;

        let id = self
            .inner
            .store
            .create(|id| MergeJob::new(id, profile, rel_inputs));
        info!(job = %id, inputs = abs_inputs.len(), %profile, "merge started");

        let ctx = Arc::clone(&self.inner);
        spawn_job(
            &runtime,
            Arc::clone(&self.inner.store),
            id,
            async move { ctx.run(id, abs_inputs, profile).await },
        );
        Ok(id)
    }

    /// Current state, re-read from its checkpoint if not in memory.
    pub fn status(&self, id: JobId) -> Result<MergeStatus> {
        self.inner
            .store
            .load_or_get(id)
            .map(|job| MergeStatus::from(&job))
            .ok_or_else(|| LibraryError::not_found(format!("merge job {id}")))
    }

    /// Path of a finished merge's output.
    pub fn download_path(&self, id: JobId) -> Result<PathBuf> {
        let job = self
            .inner
            .store
            .load_or_get(id)
            .ok_or_else(|| LibraryError::not_found(format!("merge job {id}")))?;
        match job.output_path {
            Some(path) if job.status == JobStatus::Done && path.is_file() => Ok(path),
            _ => Err(LibraryError::not_found(format!("output of merge job {id}"))),
        }
    }
}

impl MergeContext {
    fn set_phase(&self, id: JobId, phase: &str, message: impl Into<String>) {
        let message = message.into();
        self.store.update(id, |job| {
            job.phase = phase.to_string();
            job.message = message;
        });
    }

    async fn run(&self, id: JobId, inputs: Vec<PathBuf>, profile: MergeProfile) -> Result<()> {
        self.set_phase(id, "preflight", "locating encoder");
        let ffmpeg = self.locator.resolve(FFMPEG)?;
        let ffprobe = match self.locator.resolve(FFPROBE) {
            Ok(p) => Some(p),
            Err(err) => {
                warn!(job = %id, error = %err, "no duration probe; progress will be approximate");
                None
            }
        };

        self.set_phase(id, "probing", "reading input durations");
        let total = total_duration(ffprobe.as_deref(), &inputs).await;
        debug!(job = %id, total_secs = total, "merge duration");

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| LibraryError::io(&self.output_dir, e))?;
        let output = self.output_dir.join(format!("{id}.mp4"));
        let list = ConcatList::write(&self.output_dir, &inputs)?;

        self.set_phase(id, "merging", format!("{profile} merge"));
        let (status, tail) = self
            .encode(id, &ffmpeg, list.path(), profile, &output, total)
            .await?;
        drop(list);

        if status.success() && output.is_file() {
            self.store.update(id, |job| {
                job.status = JobStatus::Done;
                job.phase = "done".to_string();
                job.message = "merge finished".to_string();
                job.progress_pct = 100;
                job.output_path = Some(output.clone());
            });
            info!(job = %id, output = %output.display(), "merge finished");
            return Ok(());
        }

        if let Err(err) = tokio::fs::remove_file(&output).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %output.display(), error = %err, "partial output not removed");
            }
        }
        let detail = if tail.is_empty() {
            format!("exited with {status}")
        } else {
            format!("exited with {status}\n{}", tail.render())
        };
        Err(LibraryError::ToolFailed {
            tool: FFMPEG.to_string(),
            detail,
        })
    }

    /// Run the encoder, streaming progress into the job.
    async fn encode(
        &self,
        id: JobId,
        ffmpeg: &Path,
        list: &Path,
        profile: MergeProfile,
        output: &Path,
        total_secs: f64,
    ) -> Result<(ExitStatus, DiagnosticTail)> {
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(list)
            .args(profile.args())
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LibraryError::ToolFailed {
                tool: FFMPEG.to_string(),
                detail: format!("could not start {}: {e}", ffmpeg.display()),
            })?;

        let tail = Arc::new(Mutex::new(DiagnosticTail::default()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&tail);
            tokio::spawn(collect_diagnostics(stderr, tail))
        });

        if let Some(stdout) = child.stdout.take() {
            let mut tracker = ProgressTracker::new(total_secs);
            let mut lines = LinesStream::new(BufReader::new(stdout).lines());
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(l) => l,
                    Err(err) => {
                        warn!(job = %id, error = %err, "progress stream broke");
                        break;
                    }
                };
                match parse_line(&line) {
                    ProgressLine::OutTime(us) => {
                        if let Some(pct) = tracker.observe(us) {
                            self.store.update(id, |job| {
                                job.progress_pct = job.progress_pct.max(pct);
                            });
                        }
                    }
                    ProgressLine::End => debug!(job = %id, "encoder reported end"),
                    ProgressLine::Field(..) => {}
                    ProgressLine::Diagnostic(text) => lock_tail(&tail).push(text),
                }
            }
        }

        let status = child.wait().await.map_err(|e| LibraryError::ToolFailed {
            tool: FFMPEG.to_string(),
            detail: format!("wait failed: {e}"),
        })?;
        if let Some(task) = stderr_task {
            if let Err(err) = task.await {
                warn!(job = %id, error = %err, "stderr reader failed");
            }
        }

        let tail = lock_tail(&tail).clone();
        Ok((status, tail))
    }
}

async fn collect_diagnostics<R>(stream: R, tail: Arc<Mutex<DiagnosticTail>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LinesStream::new(BufReader::new(stream).lines());
    while let Some(Ok(line)) = lines.next().await {
        lock_tail(&tail).push(&line);
    }
}

fn lock_tail(tail: &Mutex<DiagnosticTail>) -> std::sync::MutexGuard<'_, DiagnosticTail> {
    tail.lock().unwrap_or_else(PoisonError::into_inner)
}
