//! Job control: create, query, cancel, subscribe, artifact access.

use crate::error::{Error, JobError, Result};
use crate::notifications::Subscription;
use crate::types::{JobId, JobInfo};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use super::MediaDownloader;

impl MediaDownloader {
    /// Create a job and start it
    ///
    /// The job is Queued until a concurrency slot frees up.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty or non-http(s) URL or an unknown format;
    ///   no job or process is created
    /// - `ShuttingDown` once [`shutdown`](Self::shutdown) has begun
    pub fn create_job(&self, url: &str, format: &str) -> Result<JobId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let id = self.registry.create(url, format)?;
        tracing::info!(job_id = %id, url = %url.trim(), format = %format.trim(), "job created");

        let handle = self.runner.start(id);
        self.active.insert(id, handle);
        Ok(id)
    }

    /// Snapshot of one job
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown or evicted jobs.
    pub fn job(&self, id: JobId) -> Result<JobInfo> {
        Ok(self.registry.get(id)?.info(self.config.jobs.stall_timeout))
    }

    /// Snapshots of all retained jobs, newest first
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let stall_timeout = self.config.jobs.stall_timeout;
        self.registry
            .list()
            .iter()
            .map(|job| job.info(stall_timeout))
            .collect()
    }

    /// Cancel a job
    ///
    /// Idempotent: cancelling a terminal job leaves it unchanged. A job that
    /// already Succeeded stays Succeeded. Returns the job's snapshot after
    /// the call.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown or evicted jobs.
    pub fn cancel_job(&self, id: JobId) -> Result<JobInfo> {
        if self.registry.cancel(id)? {
            tracing::info!(job_id = %id, "job cancelled");
            if let Ok(job) = self.registry.get(id) {
                self.hub.close(job.event());
            }
        }

        if let Some(handle) = self.active.get(&id) {
            handle.cancel();
        }

        self.job(id)
    }

    /// Follow a job's progress
    ///
    /// The subscription starts with the job's current state and ends after
    /// exactly one terminal event. Subscribing to a finished job yields just
    /// that terminal event.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown or evicted jobs.
    pub fn subscribe(&self, id: JobId) -> Result<Subscription> {
        let job = self.registry.get(id)?;
        Ok(self.hub.subscribe(id, job.event()))
    }

    /// Path of a Succeeded job's artifact
    ///
    /// With `jobs.delete_after_download` the artifact is handed out once;
    /// the caller serves it and then calls
    /// [`discard_artifact`](Self::discard_artifact).
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown jobs
    /// - `NotReady` unless the job Succeeded
    /// - `ArtifactMissing` if already served once or removed from disk
    pub async fn artifact(&self, id: JobId) -> Result<PathBuf> {
        let path = self
            .registry
            .artifact(id, self.config.jobs.delete_after_download)?;

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            Ok(_) => Err(JobError::ArtifactMissing { id }.into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(JobError::ArtifactMissing { id }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a job's directory after a one-time download
    pub async fn discard_artifact(&self, id: JobId) {
        let dir = self.runner.job_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::info!(job_id = %id, "one-time artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "failed to remove served artifact");
            }
        }
    }
}
