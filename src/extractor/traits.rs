//! Extractor trait and request type

use crate::types::{FormatInfo, FormatSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Everything needed to build one job's download command
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    /// Media URL (already validated)
    pub url: &'a str,
    /// Requested format
    pub format: &'a FormatSpec,
    /// Job-scoped directory the artifact must land in
    pub output_dir: &'a Path,
    /// Filename template inside `output_dir`
    pub output_template: &'a str,
    /// Optional ffmpeg binary or directory for merging and audio conversion
    pub ffmpeg_location: Option<&'a Path>,
    /// Operator-supplied extra arguments
    pub extra_args: &'a [String],
}

/// External media extraction backend
///
/// Implementations describe how to run a download; the process runner owns
/// spawning, output capture and cancellation.
///
/// # Examples
///
/// ```no_run
/// use media_dl::extractor::{CliExtractor, ExtractionRequest, Extractor};
/// use media_dl::FormatSpec;
/// use std::path::Path;
///
/// # fn main() -> media_dl::Result<()> {
/// let extractor = CliExtractor::from_path().expect("yt-dlp not found in PATH");
/// let format = FormatSpec::Mp3;
/// let request = ExtractionRequest {
///     url: "https://example.com/watch?v=1",
///     format: &format,
///     output_dir: Path::new("downloads/job"),
///     output_template: "%(title)s.%(ext)s",
///     ffmpeg_location: None,
///     extra_args: &[],
/// };
/// let command = extractor.download_command(&request)?;
/// # let _ = command;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Build the command that downloads `request.url` into `request.output_dir`
    ///
    /// The command must print line-oriented progress and exit 0 on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot run downloads at all (for
    /// example, no binary is installed).
    fn download_command(&self, request: &ExtractionRequest<'_>) -> crate::Result<Command>;

    /// List the formats available for a URL without downloading anything
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be executed, exits unsuccessfully,
    /// or prints output that cannot be parsed.
    async fn list_formats(&self, url: &str) -> crate::Result<Vec<FormatInfo>>;

    /// Human-readable name for logging and capabilities
    fn name(&self) -> &'static str;

    /// Binary in use, if any
    fn binary(&self) -> Option<PathBuf>;

    /// Whether jobs can be run with this backend
    fn available(&self) -> bool {
        self.binary().is_some()
    }
}
