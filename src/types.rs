//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::JobError;

/// Unique identifier for a job
///
/// Opaque random token; two jobs never share one, even for the same URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, format = Uuid)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Allocate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Job status
///
/// Transitions only move forward: Queued → Running → one of the terminal
/// states. Queued may also go straight to a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Accepted, waiting for a concurrency slot
    Queued,
    /// Extractor process is running
    Running,
    /// Finished with an artifact on disk
    Succeeded,
    /// Finished with an error
    Failed,
    /// Cancelled by a client or by shutdown
    Cancelled,
}

impl Status {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Succeeded | Status::Failed | Status::Cancelled)
    }

    /// Whether moving from `self` to `next` keeps the status sequence monotonic
    pub fn can_transition_to(&self, next: Status) -> bool {
        match self {
            Status::Queued => next != Status::Queued,
            Status::Running => next.is_terminal(),
            Status::Succeeded | Status::Failed | Status::Cancelled => false,
        }
    }

    /// Lowercase name, as used in frames and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Running => "running",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest custom format selector accepted
const MAX_SELECTOR_LEN: usize = 128;

/// Requested output format
///
/// Named presets cover the common cases; anything else must look like a
/// yt-dlp format selector and is passed through as [`FormatSpec::Custom`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FormatSpec {
    /// Best video merged with best audio, falling back to best single file
    #[default]
    Best,
    /// Best audio-only stream
    BestAudio,
    /// Smallest available format
    Worst,
    /// Best audio converted to mp3 (192K)
    Mp3,
    /// Best m4a audio stream
    M4a,
    /// Raw selector such as `137+140` or `bv*[height<=720]+ba`
    Custom(String),
}

/// Audio post-processing requested from the extractor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioExtraction {
    /// Target codec passed to `--audio-format`
    pub codec: &'static str,
    /// Target quality passed to `--audio-quality`
    pub quality: &'static str,
}

impl FormatSpec {
    /// Parse a client-supplied format string
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        let trimmed = raw.trim();
        match trimmed {
            "" => Err(JobError::InvalidRequest {
                reason: "format must not be empty".to_string(),
            }),
            "best" => Ok(FormatSpec::Best),
            "bestaudio" => Ok(FormatSpec::BestAudio),
            "worst" => Ok(FormatSpec::Worst),
            "mp3" => Ok(FormatSpec::Mp3),
            "m4a" => Ok(FormatSpec::M4a),
            other if is_selector(other) => Ok(FormatSpec::Custom(other.to_string())),
            other => Err(JobError::InvalidRequest {
                reason: format!("unrecognized format '{}'", other),
            }),
        }
    }

    /// Selector handed to the extractor's `-f` flag
    pub fn selector(&self) -> &str {
        match self {
            FormatSpec::Best => "bestvideo*+bestaudio/best",
            FormatSpec::BestAudio | FormatSpec::Mp3 => "bestaudio/best",
            FormatSpec::Worst => "worst",
            FormatSpec::M4a => "bestaudio[ext=m4a]/bestaudio/best",
            FormatSpec::Custom(selector) => selector,
        }
    }

    /// Audio conversion to request, if any
    pub fn audio_extraction(&self) -> Option<AudioExtraction> {
        match self {
            FormatSpec::Mp3 => Some(AudioExtraction {
                codec: "mp3",
                quality: "192K",
            }),
            _ => None,
        }
    }

    /// Name as the client would write it
    pub fn as_str(&self) -> &str {
        match self {
            FormatSpec::Best => "best",
            FormatSpec::BestAudio => "bestaudio",
            FormatSpec::Worst => "worst",
            FormatSpec::Mp3 => "mp3",
            FormatSpec::M4a => "m4a",
            FormatSpec::Custom(selector) => selector,
        }
    }
}

fn is_selector(s: &str) -> bool {
    s.len() <= MAX_SELECTOR_LEN
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(
                    c,
                    '+' | '/' | '[' | ']' | '<' | '>' | '=' | '*' | ':' | '.' | ',' | '_' | '-' | '!'
                )
        })
}

impl std::fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FormatSpec {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FormatSpec {
    type Error = JobError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FormatSpec> for String {
    fn from(spec: FormatSpec) -> Self {
        spec.as_str().to_string()
    }
}

/// Progress fields recognized on one line of extractor output
///
/// `rate` and `eta` are `None` when the tool reports them as unknown; they
/// are never defaulted to zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Progress {
    /// Completion percentage, clamped to 0.0..=100.0
    pub percent: f64,
    /// Transfer rate as printed by the tool (e.g. "1.2MiB/s")
    pub rate: Option<String>,
    /// Estimated remaining time as printed by the tool (e.g. "00:05")
    pub eta: Option<String>,
    /// Total size as printed by the tool (e.g. "10MiB")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<String>,
}

/// Progress update for one job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Job the update belongs to
    pub job_id: JobId,
    /// Completion percentage, clamped to 0.0..=100.0
    pub percent: f64,
    /// Transfer rate, `None` when unknown
    pub rate: Option<String>,
    /// Estimated remaining time, `None` when unknown
    pub eta: Option<String>,
    /// When the line was read
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Stamp parsed progress with its job and the current time
    pub fn new(job_id: JobId, progress: Progress) -> Self {
        Self {
            job_id,
            percent: progress.percent,
            rate: progress.rate,
            eta: progress.eta,
            timestamp: Utc::now(),
        }
    }

    /// Progress fields without job and timestamp
    pub fn progress(&self) -> Progress {
        Progress {
            percent: self.percent,
            rate: self.rate.clone(),
            eta: self.eta.clone(),
            total_size: None,
        }
    }
}

/// Event delivered on a job's notification stream
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    /// Non-terminal status snapshot (initial replay, Queued → Running)
    Status {
        /// Job ID
        job_id: JobId,
        /// Current status
        status: Status,
        /// Latest known progress
        progress: Progress,
    },
    /// Progress parsed from extractor output
    Progress(ProgressEvent),
    /// Final event; the stream closes right after it
    Terminal {
        /// Job ID
        job_id: JobId,
        /// Succeeded, Failed or Cancelled
        status: Status,
        /// Progress at the time of the transition
        progress: Progress,
        /// Artifact path for succeeded jobs
        output_path: Option<PathBuf>,
        /// Human-readable error for failed jobs
        error: Option<String>,
    },
}

impl JobEvent {
    /// Job the event belongs to
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Status { job_id, .. } | JobEvent::Terminal { job_id, .. } => *job_id,
            JobEvent::Progress(event) => event.job_id,
        }
    }

    /// Whether this is the stream's closing event
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Terminal { .. })
    }

    /// Status implied by the event
    pub fn status(&self) -> Status {
        match self {
            JobEvent::Status { status, .. } | JobEvent::Terminal { status, .. } => *status,
            JobEvent::Progress(_) => Status::Running,
        }
    }
}

/// JSON frame pushed to WebSocket subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobFrame {
    /// Job ID
    pub job_id: JobId,
    /// Completion percentage
    pub percent: f64,
    /// Transfer rate, null when unknown
    pub rate: Option<String>,
    /// Estimated remaining time, null when unknown
    pub eta: Option<String>,
    /// Job status after this event
    pub status: Status,
    /// Error detail on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Artifact path on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl From<&JobEvent> for JobFrame {
    fn from(event: &JobEvent) -> Self {
        match event {
            JobEvent::Status {
                job_id,
                status,
                progress,
            } => JobFrame {
                job_id: *job_id,
                percent: progress.percent,
                rate: progress.rate.clone(),
                eta: progress.eta.clone(),
                status: *status,
                error: None,
                output_path: None,
            },
            JobEvent::Progress(p) => JobFrame {
                job_id: p.job_id,
                percent: p.percent,
                rate: p.rate.clone(),
                eta: p.eta.clone(),
                status: Status::Running,
                error: None,
                output_path: None,
            },
            JobEvent::Terminal {
                job_id,
                status,
                progress,
                output_path,
                error,
            } => JobFrame {
                job_id: *job_id,
                percent: progress.percent,
                rate: progress.rate.clone(),
                eta: progress.eta.clone(),
                status: *status,
                error: error.clone(),
                output_path: output_path.clone(),
            },
        }
    }
}

/// Job status snapshot returned by the API
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Job ID
    pub id: JobId,
    /// Requested media URL
    pub url: String,
    /// Requested format, as given by the client
    pub format: String,
    /// Current status
    pub status: Status,
    /// Latest progress snapshot
    pub progress: Progress,
    /// Artifact path (only when succeeded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Error detail (only when failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Running with no extractor output for longer than the stall timeout
    pub stalled: bool,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the extractor process was started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One format offered by the extractor for a URL
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FormatInfo {
    /// Extractor format identifier (usable as a custom selector)
    pub format_id: String,
    /// Container extension
    pub ext: Option<String>,
    /// Resolution such as "1920x1080" or "audio only"
    pub resolution: Option<String>,
    /// Extractor note such as "1080p" or "medium"
    pub note: Option<String>,
}

/// System capabilities
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// Extraction backend
    pub extractor: ExtractorInfo,
}

/// Extraction backend information
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtractorInfo {
    /// Backend name (e.g. "yt-dlp")
    pub name: String,
    /// Whether jobs can actually be run
    pub available: bool,
    /// Binary in use, if any
    pub binary: Option<PathBuf>,
}
