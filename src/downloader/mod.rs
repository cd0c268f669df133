//! Job orchestration, split into focused submodules.
//!
//! [`MediaDownloader`] ties the registry, notification hub and process runner
//! together:
//! - [`control`] - create, cancel and query jobs
//! - [`services`] - periodic eviction and stall reporting
//! - [`lifecycle`] - shutdown coordination

mod control;
mod lifecycle;
mod services;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::config::{Config, ToolsConfig};
use crate::error::{Error, Result};
use crate::extractor::{CliExtractor, Extractor, UnavailableExtractor};
use crate::notifications::NotificationHub;
use crate::registry::JobRegistry;
use crate::runner::{ProcessRunner, RunHandle};
use crate::types::{Capabilities, ExtractorInfo, FormatInfo, JobId};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Main service instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Job table
    pub(crate) registry: JobRegistry,
    /// Per-job event fan-out
    pub(crate) hub: NotificationHub,
    /// Subprocess supervisor (owns the concurrency limit)
    pub(crate) runner: ProcessRunner,
    /// Extraction backend
    pub(crate) extractor: Arc<dyn Extractor>,
    /// Handles of started jobs, pruned once their task exits
    pub(crate) active: Arc<DashMap<JobId, RunHandle>>,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// - Validates the configuration
    /// - Creates the output directory
    /// - Picks the extractor: explicit `tools.ytdlp_path`, then a PATH
    ///   search for `yt-dlp`, then [`UnavailableExtractor`]
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default()).await?;
    ///     let _maintenance = downloader.spawn_maintenance();
    ///
    ///     let id = downloader.create_job("https://example.com/watch?v=1", "mp3")?;
    ///     let mut events = downloader.subscribe(id)?;
    ///     while let Some(event) = events.recv().await {
    ///         println!("{:?}", event);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        let extractor = select_extractor(&config.tools);
        Self::with_extractor(config, extractor).await
    }

    /// Create an instance with a caller-supplied extraction backend
    pub async fn with_extractor(config: Config, extractor: Arc<dyn Extractor>) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.jobs.output_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create output directory '{}': {}",
                        config.jobs.output_dir.display(),
                        e
                    ),
                ))
            })?;

        tracing::info!(
            extractor = extractor.name(),
            available = extractor.available(),
            binary = ?extractor.binary(),
            "Extractor initialized"
        );

        let config = Arc::new(config);
        let registry = JobRegistry::new();
        let hub = NotificationHub::new(config.jobs.subscriber_buffer);
        let runner = ProcessRunner::new(
            extractor.clone(),
            registry.clone(),
            hub.clone(),
            config.clone(),
        );

        Ok(Self {
            config,
            registry,
            hub,
            runner,
            extractor,
            active: Arc::new(DashMap::new()),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Query the extraction backend
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            extractor: ExtractorInfo {
                name: self.extractor.name().to_string(),
                available: self.extractor.available(),
                binary: self.extractor.binary(),
            },
        }
    }

    /// List the formats a URL offers, without downloading
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the URL is not a valid http(s) URL
    /// - `ExternalTool` if the probe fails
    /// - `NotSupported` if no extractor binary is available
    pub async fn list_formats(&self, url: &str) -> Result<Vec<FormatInfo>> {
        let url = crate::registry::validate_url(url)?;
        self.extractor.list_formats(&url).await
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}

fn select_extractor(tools: &ToolsConfig) -> Arc<dyn Extractor> {
    if let Some(ref path) = tools.ytdlp_path {
        Arc::new(CliExtractor::new(path.clone()))
    } else if tools.search_path {
        CliExtractor::from_path()
            .map(|e| Arc::new(e) as Arc<dyn Extractor>)
            .unwrap_or_else(|| {
                tracing::warn!("yt-dlp not found in PATH, jobs will fail until it is installed");
                Arc::new(UnavailableExtractor)
            })
    } else {
        tracing::warn!("No yt-dlp path configured and PATH search disabled");
        Arc::new(UnavailableExtractor)
    }
}
