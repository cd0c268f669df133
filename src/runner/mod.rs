//! Process runner
//!
//! Runs one extractor subprocess per job:
//!
//! 1. wait for a concurrency permit (cancellable, nothing is spawned yet)
//! 2. check free space and create the job-scoped directory `<output_dir>/<job_id>`
//! 3. spawn the extractor with piped stdout/stderr
//! 4. pump both streams line by line through the progress parser into the
//!    registry and notification hub
//! 5. on exit, drain the remaining output, locate the artifact in the job
//!    directory and record the terminal state
//!
//! The runner only emits a terminal notification when its own registry
//! transition applied, so a job cancelled through the API and finishing at
//! the same moment produces exactly one terminal event.

mod output;

use crate::config::Config;
use crate::error::{Error, JobError};
use crate::extractor::{ExtractionRequest, Extractor};
use crate::notifications::NotificationHub;
use crate::progress;
use crate::registry::{Job, JobRegistry};
use crate::types::{JobEvent, JobId, ProgressEvent, Status};
use crate::utils;
use output::{OutputLine, StderrTail, Stream, locate_artifact, spawn_line_pump};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lines buffered between the output pumps and the job task
const LINE_BUFFER: usize = 256;

/// How long a terminated extractor gets to exit before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// How long output still buffered after the extractor exits is read for
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// How a job's run ended, before it is recorded
enum Outcome {
    Succeeded(PathBuf),
    Failed(Error),
    Cancelled,
}

/// Handle to a started job
///
/// Cancelling the handle terminates the subprocess (or stops the job from
/// ever spawning one if it is still waiting for a slot).
pub struct RunHandle {
    job_id: JobId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RunHandle {
    /// Job this handle controls
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Ask the job task to stop; safe to call more than once
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the job task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job task to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(job_id = %self.job_id, error = %e, "job task ended abnormally");
        }
    }
}

/// Spawns and supervises extractor subprocesses
///
/// Cloning is cheap; clones share the registry, hub and concurrency limit.
#[derive(Clone)]
pub struct ProcessRunner {
    extractor: Arc<dyn Extractor>,
    registry: JobRegistry,
    hub: NotificationHub,
    config: Arc<Config>,
    permits: Arc<Semaphore>,
}

impl ProcessRunner {
    /// Create a runner allowing `config.jobs.max_concurrent_jobs` live subprocesses
    pub fn new(
        extractor: Arc<dyn Extractor>,
        registry: JobRegistry,
        hub: NotificationHub,
        config: Arc<Config>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.jobs.max_concurrent_jobs.max(1)));
        Self {
            extractor,
            registry,
            hub,
            config,
            permits,
        }
    }

    /// Start running a Queued job in the background
    pub fn start(&self, job_id: JobId) -> RunHandle {
        let cancel = CancellationToken::new();
        let runner = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { runner.run(job_id, token).await });

        RunHandle {
            job_id,
            cancel,
            task,
        }
    }

    /// Directory owned by one job
    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.config.jobs.output_dir.join(job_id.to_string())
    }

    /// Stop handing out slots; jobs still waiting end as Cancelled
    pub fn close(&self) {
        self.permits.close();
    }

    /// Free concurrency slots
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    async fn run(self, id: JobId, cancel: CancellationToken) {
        let job_dir = self.job_dir(id);

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            self.record(id, &job_dir, Outcome::Cancelled).await;
            return;
        };

        let job = match self.registry.get(id) {
            Ok(job) if job.status == Status::Queued => job,
            // Cancelled or evicted while waiting; nothing to clean up.
            _ => return,
        };

        let outcome = self.execute(&job, &job_dir, &cancel).await;
        self.record(id, &job_dir, outcome).await;
    }

    async fn execute(&self, job: &Job, job_dir: &Path, cancel: &CancellationToken) -> Outcome {
        let id = job.id;

        let jobs = &self.config.jobs;
        if let Err(e) = utils::ensure_free_space(&jobs.output_dir, jobs.min_free_space) {
            return Outcome::Failed(e);
        }

        if let Err(e) = tokio::fs::create_dir_all(job_dir).await {
            return Outcome::Failed(spawn_failure(
                id,
                format!("cannot create job directory {}: {}", job_dir.display(), e),
            ));
        }

        let request = ExtractionRequest {
            url: &job.url,
            format: &job.format,
            output_dir: job_dir,
            output_template: &self.config.tools.output_template,
            ffmpeg_location: self.config.tools.ffmpeg_location.as_deref(),
            extra_args: &self.config.tools.extra_args,
        };
        let mut command = match self.extractor.download_command(&request) {
            Ok(command) => command,
            Err(e) => return Outcome::Failed(spawn_failure(id, e.to_string())),
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    job_id = %id,
                    extractor = self.extractor.name(),
                    error = %e,
                    "failed to spawn extractor"
                );
                return Outcome::Failed(spawn_failure(id, e.to_string()));
            }
        };

        // Gone from the child once it has been waited on
        #[cfg(unix)]
        let pid = child.id();

        if !self.registry.mark_running(id).unwrap_or(false) {
            terminate(&mut child, id).await;
            return Outcome::Cancelled;
        }
        tracing::info!(
            job_id = %id,
            pid = child.id(),
            url = %job.url,
            format = %job.format,
            "extractor started"
        );
        if let Ok(job) = self.registry.get(id) {
            self.hub.publish(job.event());
        }

        let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_pump(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_pump(stderr, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let mut tail = StderrTail::new(self.config.jobs.stderr_tail_lines);
        let mut pipes_open = true;
        let exit = loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                status = child.wait() => break Some(status),
                line = rx.recv(), if pipes_open => line,
            };
            match line {
                Some(line) => self.handle_line(id, &line, &mut tail),
                None => pipes_open = false,
            }
        };
        let status = match exit {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                return Outcome::Failed(extraction_failure(
                    id,
                    format!("failed to wait for extractor: {}", e),
                ));
            }
            None => {
                terminate(&mut child, id).await;
                return Outcome::Cancelled;
            }
        };

        // Descendants may still hold the pipes after the extractor exits
        if pipes_open {
            let drain = async {
                while let Some(line) = rx.recv().await {
                    self.handle_line(id, &line, &mut tail);
                }
            };
            if tokio::time::timeout(OUTPUT_DRAIN, drain).await.is_err() {
                tracing::warn!(
                    job_id = %id,
                    "extractor exited but its output is still open, stopping leftover processes"
                );
                #[cfg(unix)]
                if let Some(pid) = pid {
                    signal_group(pid, libc::SIGKILL);
                }
            }
        }

        if !status.success() {
            let detail = tail.joined();
            let reason = if detail.is_empty() {
                format!("exited with {}", status)
            } else {
                detail
            };
            tracing::warn!(job_id = %id, %status, "extractor exited unsuccessfully");
            return Outcome::Failed(extraction_failure(id, reason));
        }

        match locate_artifact(job_dir).await {
            Ok(Some(path)) => Outcome::Succeeded(path),
            Ok(None) => Outcome::Failed(extraction_failure(
                id,
                "extractor exited successfully but produced no output file".into(),
            )),
            Err(e) => Outcome::Failed(extraction_failure(
                id,
                format!("cannot read job directory {}: {}", job_dir.display(), e),
            )),
        }
    }

    fn handle_line(&self, id: JobId, line: &OutputLine, tail: &mut StderrTail) {
        self.registry.touch(id);
        if line.stream == Stream::Stderr {
            tail.push(&line.text);
        }

        match progress::parse(&line.text) {
            Some(progress) => {
                let event = ProgressEvent::new(id, progress);
                if self.registry.update_progress(id, &event).unwrap_or(false) {
                    self.hub.publish(JobEvent::Progress(event));
                }
            }
            None => tracing::trace!(job_id = %id, line = %line.text, "skipped non-progress line"),
        }
    }

    /// Apply an outcome to the registry and notify subscribers if it took effect
    async fn record(&self, id: JobId, job_dir: &Path, outcome: Outcome) {
        let keep_dir = match outcome {
            Outcome::Succeeded(path) => {
                let applied = self.registry.complete(id, path.clone()).unwrap_or(false);
                if applied {
                    tracing::info!(job_id = %id, output = %path.display(), "job succeeded");
                    self.close_topic(id);
                }
                applied
            }
            Outcome::Failed(error) => {
                if self.registry.fail(id, error.to_string()).unwrap_or(false) {
                    tracing::warn!(job_id = %id, error = %error, "job failed");
                    self.close_topic(id);
                }
                false
            }
            Outcome::Cancelled => {
                if self.registry.cancel(id).unwrap_or(false) {
                    tracing::info!(job_id = %id, "job cancelled");
                    self.close_topic(id);
                }
                false
            }
        };

        if !keep_dir {
            remove_job_dir(job_dir).await;
        }
    }

    fn close_topic(&self, id: JobId) {
        if let Ok(job) = self.registry.get(id) {
            self.hub.close(job.event());
        }
    }
}

fn spawn_failure(id: JobId, reason: String) -> Error {
    JobError::ProcessSpawnFailure { id, reason }.into()
}

fn extraction_failure(id: JobId, reason: String) -> Error {
    JobError::ExtractionFailure { id, reason }.into()
}

/// Stop the extractor and everything it started
///
/// On unix the extractor leads its own process group, so ffmpeg children
/// get the signal too: SIGTERM first, SIGKILL after a grace period.
async fn terminate(child: &mut Child, id: JobId) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGTERM);
        if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
            tracing::debug!(job_id = %id, "extractor terminated");
            return;
        }
        signal_group(pid, libc::SIGKILL);
    }

    if let Err(e) = child.kill().await {
        tracing::debug!(job_id = %id, error = %e, "failed to kill extractor");
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group the child leads.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

async fn remove_job_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove job directory");
        }
    }
}
