//! In-memory job registry
//!
//! The registry owns every [`Job`] from creation until eviction. Jobs live in
//! a sharded [`DashMap`], so mutating one job never blocks readers or writers
//! of jobs that hash to a different shard, and every read returns a whole
//! snapshot taken under the shard lock.
//!
//! Status transitions go through [`Status::can_transition_to`]. The terminal
//! operations ([`JobRegistry::complete`], [`JobRegistry::fail`],
//! [`JobRegistry::cancel`]) return `true` only for the call that actually
//! moved the job; every later call is a no-op returning `false`. Callers use
//! that flag to decide who emits the terminal notification.

use crate::error::{JobError, Result};
use crate::types::{FormatSpec, JobEvent, JobId, JobInfo, Progress, ProgressEvent, Status};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of one download job
#[derive(Clone, Debug)]
pub struct Job {
    /// Job ID
    pub id: JobId,
    /// Requested media URL
    pub url: String,
    /// Requested format
    pub format: FormatSpec,
    /// Current status
    pub status: Status,
    /// Latest progress snapshot
    pub progress: Progress,
    /// Artifact path, set only on Succeeded
    pub output_path: Option<PathBuf>,
    /// Error detail, set only on Failed
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When the job moved to Running
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Last time the extractor produced any output (or the job changed state)
    pub last_activity: Instant,
    /// Monotonic completion time, used for retention
    pub finished: Option<Instant>,
    /// Whether a one-time download already took the artifact
    pub artifact_claimed: bool,
}

impl Job {
    fn new(id: JobId, url: String, format: FormatSpec) -> Self {
        Self {
            id,
            url,
            format,
            status: Status::Queued,
            progress: Progress::default(),
            output_path: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_activity: Instant::now(),
            finished: None,
            artifact_claimed: false,
        }
    }

    /// Running with no output for at least `stall_timeout`
    pub fn is_stalled(&self, stall_timeout: Duration) -> bool {
        self.status == Status::Running && self.last_activity.elapsed() >= stall_timeout
    }

    /// API snapshot of this job
    pub fn info(&self, stall_timeout: Duration) -> JobInfo {
        JobInfo {
            id: self.id,
            url: self.url.clone(),
            format: self.format.to_string(),
            status: self.status,
            progress: self.progress.clone(),
            output_path: self.output_path.clone(),
            error: self.error.clone(),
            stalled: self.is_stalled(stall_timeout),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }

    /// Notification event describing the current state
    ///
    /// Terminal jobs yield [`JobEvent::Terminal`], everything else a
    /// [`JobEvent::Status`] snapshot.
    pub fn event(&self) -> JobEvent {
        if self.status.is_terminal() {
            JobEvent::Terminal {
                job_id: self.id,
                status: self.status,
                progress: self.progress.clone(),
                output_path: self.output_path.clone(),
                error: self.error.clone(),
            }
        } else {
            JobEvent::Status {
                job_id: self.id,
                status: self.status,
                progress: self.progress.clone(),
            }
        }
    }

    fn finish(&mut self, status: Status) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.finished = Some(Instant::now());
        self.last_activity = Instant::now();
    }
}

/// Shared job table
///
/// Cloning is cheap; all clones see the same jobs.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, Job>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the request and insert a new Queued job
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidRequest`] if the URL is empty, unparsable or
    /// not http(s), or if the format is not recognized. Nothing is inserted in
    /// that case.
    pub fn create(&self, url: &str, format: &str) -> Result<JobId> {
        let url = validate_url(url)?;
        let format = FormatSpec::parse(format)?;

        let id = JobId::new();
        self.jobs.insert(id, Job::new(id, url, format));
        Ok(id)
    }

    /// Snapshot of one job
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for unknown or evicted jobs.
    pub fn get(&self, id: JobId) -> Result<Job> {
        self.jobs
            .get(&id)
            .map(|job| job.clone())
            .ok_or_else(|| JobError::NotFound { id }.into())
    }

    /// Snapshots of all jobs, newest first
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|entry| entry.value().clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Number of jobs currently held
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the registry holds no jobs
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// IDs of running jobs with no output for at least `stall_timeout`
    pub fn stalled(&self, stall_timeout: Duration) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|entry| entry.is_stalled(stall_timeout))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Move a Queued job to Running
    ///
    /// Returns `false` if the job is no longer Queued (typically cancelled
    /// while waiting for a slot).
    pub fn mark_running(&self, id: JobId) -> Result<bool> {
        self.mutate(id, |job| {
            if job.status != Status::Queued {
                return false;
            }
            job.status = Status::Running;
            job.started_at = Some(Utc::now());
            job.last_activity = Instant::now();
            true
        })
    }

    /// Record extractor output without a status change
    pub fn touch(&self, id: JobId) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            job.last_activity = Instant::now();
        }
    }

    /// Store a progress update
    ///
    /// No-op (returns `false`) once the job is terminal; otherwise the
    /// snapshot is replaced and the job is Running.
    pub fn update_progress(&self, id: JobId, event: &ProgressEvent) -> Result<bool> {
        self.mutate(id, |job| {
            if job.status.is_terminal() {
                return false;
            }
            if job.status == Status::Queued {
                job.status = Status::Running;
                job.started_at = Some(Utc::now());
            }
            job.progress = event.progress();
            job.last_activity = Instant::now();
            true
        })
    }

    /// Mark a job Succeeded with its artifact path
    pub fn complete(&self, id: JobId, output_path: PathBuf) -> Result<bool> {
        self.mutate(id, |job| {
            if !job.status.can_transition_to(Status::Succeeded) {
                return false;
            }
            job.progress.percent = 100.0;
            job.progress.eta = None;
            job.output_path = Some(output_path);
            job.finish(Status::Succeeded);
            true
        })
    }

    /// Mark a job Failed with a human-readable detail
    pub fn fail(&self, id: JobId, detail: impl Into<String>) -> Result<bool> {
        let detail = detail.into();
        self.mutate(id, |job| {
            if !job.status.can_transition_to(Status::Failed) {
                return false;
            }
            job.error = Some(detail);
            job.finish(Status::Failed);
            true
        })
    }

    /// Mark a job Cancelled
    pub fn cancel(&self, id: JobId) -> Result<bool> {
        self.mutate(id, |job| {
            if !job.status.can_transition_to(Status::Cancelled) {
                return false;
            }
            job.finish(Status::Cancelled);
            true
        })
    }

    /// Hand out the artifact path of a Succeeded job
    ///
    /// With `consume` set the artifact is claimed: the first caller gets the
    /// path and every later caller gets [`JobError::ArtifactMissing`].
    ///
    /// # Errors
    ///
    /// - [`JobError::NotFound`] for unknown jobs
    /// - [`JobError::NotReady`] unless the job has Succeeded
    /// - [`JobError::ArtifactMissing`] if already claimed
    pub fn artifact(&self, id: JobId, consume: bool) -> Result<PathBuf> {
        let mut job = self
            .jobs
            .get_mut(&id)
            .ok_or(JobError::NotFound { id })?;

        if job.status != Status::Succeeded {
            return Err(JobError::NotReady {
                id,
                status: job.status,
            }
            .into());
        }
        if job.artifact_claimed {
            return Err(JobError::ArtifactMissing { id }.into());
        }
        let path = job
            .output_path
            .clone()
            .ok_or(JobError::ArtifactMissing { id })?;
        if consume {
            job.artifact_claimed = true;
        }
        Ok(path)
    }

    /// Remove terminal jobs that finished at least `older_than` ago
    ///
    /// Returns the removed jobs so the caller can release their output
    /// directories and notification topics.
    pub fn evict(&self, older_than: Duration) -> Vec<Job> {
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry
                    .finished
                    .is_some_and(|finished| finished.elapsed() >= older_than)
            })
            .map(|entry| *entry.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                // Re-check under the shard lock.
                self.jobs
                    .remove_if(&id, |_, job| {
                        job.finished
                            .is_some_and(|finished| finished.elapsed() >= older_than)
                    })
                    .map(|(_, job)| job)
            })
            .collect()
    }

    fn mutate(&self, id: JobId, f: impl FnOnce(&mut Job) -> bool) -> Result<bool> {
        let mut job = self
            .jobs
            .get_mut(&id)
            .ok_or(JobError::NotFound { id })?;
        Ok(f(&mut job))
    }
}

pub(crate) fn validate_url(raw: &str) -> std::result::Result<String, JobError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JobError::invalid("url must not be empty"));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|e| JobError::invalid(format!("invalid url '{}': {}", trimmed, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(JobError::invalid(format!(
                "url scheme '{}' is not supported, use http or https",
                other
            )));
        }
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(JobError::invalid("url must include a host"));
    }

    Ok(trimmed.to_string())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashSet;

    fn progress(id: JobId, percent: f64) -> ProgressEvent {
        ProgressEvent::new(
            id,
            Progress {
                percent,
                rate: Some("1.0MiB/s".into()),
                eta: Some("00:10".into()),
                total_size: None,
            },
        )
    }

    #[test]
    fn create_inserts_queued_job() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, Status::Queued);
        assert_eq!(job.url, "https://example.com/v1");
        assert_eq!(job.format, FormatSpec::Best);
        assert!(job.output_path.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn create_rejects_bad_input_without_inserting() {
        let registry = JobRegistry::new();
        for (url, format) in [
            ("", "best"),
            ("   ", "best"),
            ("not a url", "best"),
            ("ftp://example.com/file", "best"),
            ("file:///etc/passwd", "best"),
            ("https://example.com/v1", "flac; rm -rf /"),
            ("https://example.com/v1", ""),
        ] {
            let err = registry.create(url, format).unwrap_err();
            assert!(
                matches!(err, Error::Job(JobError::InvalidRequest { .. })),
                "({url:?}, {format:?}) gave {err:?}"
            );
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn same_url_gets_distinct_ids() {
        let registry = JobRegistry::new();
        let ids: HashSet<JobId> = (0..100)
            .map(|_| registry.create("https://example.com/v1", "best").unwrap())
            .collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        let err = registry.get(id).unwrap_err();
        assert!(matches!(err, Error::Job(JobError::NotFound { id: missing }) if missing == id));
    }

    #[test]
    fn progress_moves_job_to_running() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();

        assert!(registry.update_progress(id, &progress(id, 10.0)).unwrap());
        let job = registry.get(id).unwrap();
        assert_eq!(job.status, Status::Running);
        assert_eq!(job.progress.percent, 10.0);
        assert!(job.started_at.is_some());
    }

    #[test]
    fn terminal_transitions_are_idempotent() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();
        assert!(registry.mark_running(id).unwrap());

        assert!(registry.complete(id, PathBuf::from("/jobs/x/out.mp4")).unwrap());
        assert!(!registry.complete(id, PathBuf::from("/elsewhere")).unwrap());
        assert!(!registry.fail(id, "late failure").unwrap());
        assert!(!registry.cancel(id).unwrap());
        assert!(!registry.update_progress(id, &progress(id, 5.0)).unwrap());
        assert!(!registry.mark_running(id).unwrap());

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, Status::Succeeded);
        assert_eq!(job.output_path, Some(PathBuf::from("/jobs/x/out.mp4")));
        assert_eq!(job.progress.percent, 100.0);
        assert!(job.error.is_none());
    }

    #[test]
    fn completion_wins_over_late_cancel() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();
        registry.mark_running(id).unwrap();
        registry.complete(id, PathBuf::from("/jobs/x/out.mp4")).unwrap();

        assert!(!registry.cancel(id).unwrap());
        assert_eq!(registry.get(id).unwrap().status, Status::Succeeded);
    }

    #[test]
    fn cancel_wins_over_late_completion() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();
        registry.mark_running(id).unwrap();
        assert!(registry.cancel(id).unwrap());

        assert!(!registry.complete(id, PathBuf::from("/jobs/x/out.mp4")).unwrap());
        let job = registry.get(id).unwrap();
        assert_eq!(job.status, Status::Cancelled);
        assert!(job.output_path.is_none());
    }

    #[test]
    fn queued_job_can_be_cancelled_before_running() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "mp3").unwrap();
        assert!(registry.cancel(id).unwrap());
        assert!(!registry.mark_running(id).unwrap());
        assert_eq!(registry.get(id).unwrap().status, Status::Cancelled);
    }

    #[test]
    fn fail_records_detail() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();
        assert!(registry.fail(id, "ERROR: Unsupported URL").unwrap());

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, Status::Failed);
        assert_eq!(job.error.as_deref(), Some("ERROR: Unsupported URL"));
        assert!(matches!(job.event(), JobEvent::Terminal { status: Status::Failed, .. }));
    }

    #[test]
    fn concurrent_transitions_apply_exactly_once() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();
        registry.mark_running(id).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        registry.cancel(id).unwrap()
                    } else {
                        registry.complete(id, PathBuf::from("/out.mp4")).unwrap()
                    }
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();
        assert_eq!(applied, 1);
        assert!(registry.get(id).unwrap().status.is_terminal());
    }

    #[test]
    fn artifact_requires_success() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();

        let err = registry.artifact(id, false).unwrap_err();
        assert!(matches!(
            err,
            Error::Job(JobError::NotReady {
                status: Status::Queued,
                ..
            })
        ));

        registry.mark_running(id).unwrap();
        registry.complete(id, PathBuf::from("/out.mp4")).unwrap();
        assert_eq!(registry.artifact(id, false).unwrap(), PathBuf::from("/out.mp4"));
        assert_eq!(registry.artifact(id, false).unwrap(), PathBuf::from("/out.mp4"));
    }

    #[test]
    fn consumed_artifact_is_handed_out_once() {
        let registry = JobRegistry::new();
        let id = registry.create("https://example.com/v1", "best").unwrap();
        registry.mark_running(id).unwrap();
        registry.complete(id, PathBuf::from("/out.mp4")).unwrap();

        assert!(registry.artifact(id, true).is_ok());
        let err = registry.artifact(id, true).unwrap_err();
        assert!(matches!(err, Error::Job(JobError::ArtifactMissing { .. })));
    }

    #[test]
    fn evict_removes_only_terminal_jobs() {
        let registry = JobRegistry::new();
        let done = registry.create("https://example.com/a", "best").unwrap();
        let running = registry.create("https://example.com/b", "best").unwrap();
        let queued = registry.create("https://example.com/c", "best").unwrap();
        registry.mark_running(done).unwrap();
        registry.complete(done, PathBuf::from("/a.mp4")).unwrap();
        registry.mark_running(running).unwrap();

        // Retention not yet elapsed.
        assert!(registry.evict(Duration::from_secs(3600)).is_empty());

        let evicted = registry.evict(Duration::ZERO);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, done);
        assert!(registry.get(done).is_err());
        assert!(registry.get(running).is_ok());
        assert!(registry.get(queued).is_ok());
    }

    #[test]
    fn stalled_only_reports_running_jobs() {
        let registry = JobRegistry::new();
        let queued = registry.create("https://example.com/a", "best").unwrap();
        let running = registry.create("https://example.com/b", "best").unwrap();
        registry.mark_running(running).unwrap();

        let stalled = registry.stalled(Duration::ZERO);
        assert_eq!(stalled, vec![running]);
        assert!(registry.get(running).unwrap().info(Duration::ZERO).stalled);
        assert!(!registry.get(queued).unwrap().info(Duration::ZERO).stalled);
        assert!(registry.stalled(Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn list_is_newest_first() {
        let registry = JobRegistry::new();
        let first = registry.create("https://example.com/a", "best").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = registry.create("https://example.com/b", "best").unwrap();

        let ids: Vec<JobId> = registry.list().into_iter().map(|job| job.id).collect();
        assert_eq!(ids, vec![second, first]);
    }
}
