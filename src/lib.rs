//! # media-dl
//!
//! Job service that wraps the `yt-dlp` media extractor behind HTTP and
//! WebSocket endpoints.
//!
//! ## Design Philosophy
//!
//! - **One job, one subprocess** - every accepted URL gets its own job id,
//!   its own output directory and at most one live extractor process
//! - **Push, not poll** - clients subscribe to a job and receive progress
//!   events followed by exactly one terminal event
//! - **Bounded everything** - concurrent processes, subscriber buffers and
//!   job retention all have configurable limits
//! - **Library-first** - the HTTP server is a thin layer over
//!   [`MediaDownloader`], which can be embedded directly
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     let id = downloader.create_job("https://example.com/watch?v=1", "best")?;
//!     let mut events = downloader.subscribe(id)?;
//!     while let Some(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     println!("Finished: {:?}", downloader.job(id)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API and push channel
pub mod api;
/// Configuration types
pub mod config;
/// Service facade (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Extraction backends
pub mod extractor;
/// Per-job event fan-out
pub mod notifications;
/// Extractor progress line parsing
pub mod progress;
/// In-memory job table
pub mod registry;
/// Subprocess supervision
pub mod runner;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{ApiConfig, Config, JobConfig, ToolsConfig};
pub use downloader::MediaDownloader;
pub use error::{ApiError, Error, ErrorDetail, JobError, Result, ToHttpStatus};
pub use extractor::{CliExtractor, ExtractionRequest, Extractor, UnavailableExtractor};
pub use notifications::{NotificationHub, Subscription};
pub use registry::JobRegistry;
pub use types::{
    Capabilities, FormatInfo, FormatSpec, JobEvent, JobFrame, JobId, JobInfo, Progress,
    ProgressEvent, Status,
};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method,
/// which cancels live jobs and terminates their subprocesses.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            match signal(SignalKind::interrupt()) {
                Ok(mut sigint) => {
                    sigint.recv().await;
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
                Err(_) => ctrl_c_fallback().await,
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM signal");
                }
                Err(_) => ctrl_c_fallback().await,
            }
        }
    }
}

#[cfg(unix)]
async fn ctrl_c_fallback() {
    tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
    tokio::signal::ctrl_c().await.ok();
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
