//! Extractor used when no yt-dlp binary can be found

use super::traits::{ExtractionRequest, Extractor};
use crate::types::FormatInfo;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

const MISSING_BINARY: &str = "downloads require the yt-dlp binary. \
     Set tools.ytdlp_path in the config or make sure yt-dlp is in PATH.";

/// Extractor that refuses every operation with `Error::NotSupported`
///
/// Lets the service start without yt-dlp installed; each job then fails
/// with a process spawn failure that names the missing binary.
///
/// # Examples
///
/// ```
/// use media_dl::extractor::{Extractor, UnavailableExtractor};
///
/// # #[tokio::main]
/// # async fn main() {
/// let extractor = UnavailableExtractor;
/// assert!(!extractor.available());
/// assert!(extractor.list_formats("https://example.com/v").await.is_err());
/// # }
/// ```
pub struct UnavailableExtractor;

#[async_trait]
impl Extractor for UnavailableExtractor {
    fn download_command(&self, _request: &ExtractionRequest<'_>) -> crate::Result<Command> {
        Err(crate::Error::NotSupported(MISSING_BINARY.into()))
    }

    async fn list_formats(&self, _url: &str) -> crate::Result<Vec<FormatInfo>> {
        Err(crate::Error::NotSupported(MISSING_BINARY.into()))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn binary(&self) -> Option<PathBuf> {
        None
    }
}
