//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// External extractor settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Directory or binary passed to `--ffmpeg-location` (default: let yt-dlp find it)
    #[serde(default)]
    pub ffmpeg_location: Option<PathBuf>,

    /// Extra arguments appended before the output template (e.g. `--cookies`, `--proxy`)
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Output filename template inside the job directory (default: "%(title)s.%(ext)s")
    #[serde(default = "default_output_template")]
    pub output_template: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            ffmpeg_location: None,
            extra_args: Vec::new(),
            output_template: default_output_template(),
        }
    }
}

/// Job execution and retention settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Root directory; each job writes into `<output_dir>/<job_id>` (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum number of extractor processes running at once (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: usize,

    /// How long terminal jobs are kept before eviction (default: 1 hour)
    #[serde(default = "default_retention", with = "duration_serde")]
    pub retention: Duration,

    /// How often the eviction pass runs (default: 60 seconds)
    #[serde(default = "default_eviction_interval", with = "duration_serde")]
    pub eviction_interval: Duration,

    /// A running job with no output for this long is reported as stalled (default: 120 seconds)
    #[serde(default = "default_stall_timeout", with = "duration_serde")]
    pub stall_timeout: Duration,

    /// Number of trailing stderr lines kept as the failure detail (default: 20)
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,

    /// Per-subscriber event buffer; the oldest events are dropped on overflow (default: 64)
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Serve each artifact once and delete it afterwards (default: false)
    #[serde(default)]
    pub delete_after_download: bool,

    /// Minimum free bytes in `output_dir` required to start a job, 0 disables (default: 512 MiB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// How long shutdown waits for cancelled processes to exit (default: 10 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_concurrent_jobs: default_max_concurrent(),
            retention: default_retention(),
            eviction_interval: default_eviction_interval(),
            stall_timeout: default_stall_timeout(),
            stderr_tail_lines: default_stderr_tail_lines(),
            subscriber_buffer: default_subscriber_buffer(),
            delete_after_download: false,
            min_free_space: default_min_free_space(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Extractor binary and arguments
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Job execution, retention and limits
    #[serde(default)]
    pub jobs: JobConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Root output directory
    pub fn output_dir(&self) -> &PathBuf {
        &self.jobs.output_dir
    }

    /// Load a JSON config file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.jobs.max_concurrent_jobs == 0 {
            return Err(Error::Config {
                message: "max_concurrent_jobs must be at least 1".into(),
                key: Some("max_concurrent_jobs".into()),
            });
        }
        if self.jobs.subscriber_buffer == 0 {
            return Err(Error::Config {
                message: "subscriber_buffer must be at least 1".into(),
                key: Some("subscriber_buffer".into()),
            });
        }
        if self.jobs.eviction_interval.is_zero() {
            return Err(Error::Config {
                message: "eviction_interval must be greater than zero".into(),
                key: Some("eviction_interval".into()),
            });
        }
        if self.tools.output_template.contains('/') || self.tools.output_template.contains('\\')
        {
            return Err(Error::Config {
                message: "output_template must be a file name, not a path".into(),
                key: Some("output_template".into()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_output_template() -> String {
    "%(title)s.%(ext)s".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_retention() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_eviction_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_stall_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_stderr_tail_lines() -> usize {
    20
}

fn default_subscriber_buffer() -> usize {
    64
}

fn default_min_free_space() -> u64 {
    512 * 1024 * 1024
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
