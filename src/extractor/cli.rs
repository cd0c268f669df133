//! CLI extractor using the external yt-dlp binary

use super::traits::{ExtractionRequest, Extractor};
use crate::types::FormatInfo;
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;

/// Lines of stderr quoted when a format probe fails
const PROBE_ERROR_LINES: usize = 5;

/// Extractor backed by the `yt-dlp` executable
///
/// # Examples
///
/// ```no_run
/// use media_dl::extractor::{CliExtractor, Extractor};
/// use std::path::PathBuf;
///
/// // Explicit path
/// let extractor = CliExtractor::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let extractor = CliExtractor::from_path().expect("yt-dlp not found in PATH");
/// assert!(extractor.available());
/// ```
pub struct CliExtractor {
    binary_path: PathBuf,
}

impl CliExtractor {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find yt-dlp in PATH
    ///
    /// Returns `None` if the binary is not found.
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Arguments for a download, in order
    pub fn download_args(request: &ExtractionRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["--newline", "--no-colors", "--no-playlist", "-f"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(request.format.selector().into());

        if let Some(audio) = request.format.audio_extraction() {
            args.extend(
                [
                    "-x",
                    "--audio-format",
                    audio.codec,
                    "--audio-quality",
                    audio.quality,
                ]
                .map(OsString::from),
            );
        }

        if let Some(ffmpeg) = request.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.as_os_str().to_owned());
        }

        args.extend(request.extra_args.iter().map(OsString::from));

        args.push("-o".into());
        args.push(
            request
                .output_dir
                .join(request.output_template)
                .into_os_string(),
        );
        args.push("--".into());
        args.push(request.url.into());
        args
    }
}

#[async_trait]
impl Extractor for CliExtractor {
    fn download_command(&self, request: &ExtractionRequest<'_>) -> crate::Result<Command> {
        let mut command = Command::new(&self.binary_path);
        command.args(Self::download_args(request));
        Ok(command)
    }

    async fn list_formats(&self, url: &str) -> crate::Result<Vec<FormatInfo>> {
        let output = Command::new(&self.binary_path)
            .args([
                "-J",
                "--no-playlist",
                "--skip-download",
                "--no-warnings",
                "--",
                url,
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr
                .lines()
                .filter(|line| !line.trim().is_empty())
                .collect();
            let tail = tail[tail.len().saturating_sub(PROBE_ERROR_LINES)..].join("\n");
            return Err(crate::Error::ExternalTool(if tail.is_empty() {
                format!("yt-dlp exited with {}", output.status)
            } else {
                tail
            }));
        }

        parse_formats(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn binary(&self) -> Option<PathBuf> {
        Some(self.binary_path.clone())
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    formats: Vec<ProbeFormat>,
    #[serde(default)]
    format_id: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    format_note: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format_id: String,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    format_note: Option<String>,
}

impl From<ProbeFormat> for FormatInfo {
    fn from(format: ProbeFormat) -> Self {
        FormatInfo {
            format_id: format.format_id,
            ext: format.ext,
            resolution: format.resolution,
            note: format.format_note,
        }
    }
}

/// Parse the JSON printed by `yt-dlp -J`
///
/// Media with a single format has no `formats` array; its top-level
/// `format_id` is reported instead.
pub(crate) fn parse_formats(json: &[u8]) -> crate::Result<Vec<FormatInfo>> {
    let probe: ProbeOutput = serde_json::from_slice(json)?;
    if !probe.formats.is_empty() {
        return Ok(probe.formats.into_iter().map(FormatInfo::from).collect());
    }
    Ok(probe
        .format_id
        .map(|format_id| FormatInfo {
            format_id,
            ext: probe.ext,
            resolution: probe.resolution,
            note: probe.format_note,
        })
        .into_iter()
        .collect())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FormatSpec;
    use std::path::Path;

    fn request<'a>(
        format: &'a FormatSpec,
        extra_args: &'a [String],
        ffmpeg: Option<&'a Path>,
    ) -> ExtractionRequest<'a> {
        ExtractionRequest {
            url: "https://example.com/watch?v=1",
            format,
            output_dir: Path::new("/srv/downloads/job-1"),
            output_template: "%(title)s.%(ext)s",
            ffmpeg_location: ffmpeg,
            extra_args,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.into_string().unwrap())
            .collect()
    }

    #[test]
    fn best_download_args() {
        let format = FormatSpec::Best;
        let args = strings(CliExtractor::download_args(&request(&format, &[], None)));
        assert_eq!(
            args,
            vec![
                "--newline",
                "--no-colors",
                "--no-playlist",
                "-f",
                "bestvideo*+bestaudio/best",
                "-o",
                "/srv/downloads/job-1/%(title)s.%(ext)s",
                "--",
                "https://example.com/watch?v=1",
            ]
        );
    }

    #[test]
    fn mp3_requests_audio_extraction() {
        let format = FormatSpec::Mp3;
        let ffmpeg = Path::new("/opt/ffmpeg/bin");
        let extra = vec!["--cookies".to_string(), "cookies.txt".to_string()];
        let args = strings(CliExtractor::download_args(&request(
            &format,
            &extra,
            Some(ffmpeg),
        )));

        let joined = args.join(" ");
        assert!(joined.contains("-f bestaudio/best"));
        assert!(joined.contains("-x --audio-format mp3 --audio-quality 192K"));
        assert!(joined.contains("--ffmpeg-location /opt/ffmpeg/bin"));
        assert!(joined.contains("--cookies cookies.txt"));
        // URL always comes last, after the option terminator.
        assert_eq!(&args[args.len() - 2..], ["--", "https://example.com/watch?v=1"]);
    }

    #[test]
    fn url_cannot_be_read_as_an_option() {
        let format = FormatSpec::Best;
        let mut req = request(&format, &[], None);
        req.url = "-oops";
        let args = strings(CliExtractor::download_args(&req));
        let dashdash = args.iter().position(|a| a == "--").unwrap();
        assert_eq!(args[dashdash + 1], "-oops");
    }

    #[test]
    fn parses_format_list() {
        let json = br#"{
            "id": "abc",
            "title": "Example",
            "format_id": "137+140",
            "formats": [
                {"format_id": "140", "ext": "m4a", "resolution": "audio only", "format_note": "medium"},
                {"format_id": "137", "ext": "mp4", "resolution": "1920x1080", "format_note": "1080p"},
                {"format_id": "sb0", "ext": "mhtml"}
            ]
        }"#;
        let formats = parse_formats(json).unwrap();
        assert_eq!(formats.len(), 3);
        assert_eq!(formats[0].format_id, "140");
        assert_eq!(formats[0].resolution.as_deref(), Some("audio only"));
        assert_eq!(formats[1].note.as_deref(), Some("1080p"));
        assert_eq!(formats[2].resolution, None);
    }

    #[test]
    fn single_format_media_reports_top_level_format() {
        let json = br#"{"id": "x", "format_id": "0", "ext": "mp3"}"#;
        let formats = parse_formats(json).unwrap();
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id, "0");
        assert_eq!(formats[0].ext.as_deref(), Some("mp3"));
    }

    #[test]
    fn garbage_probe_output_is_an_error() {
        assert!(parse_formats(b"not json").is_err());
    }

    #[test]
    fn from_path_consistency_with_which_crate() {
        let which_result = which::which("yt-dlp");
        let from_path_result = CliExtractor::from_path();
        assert_eq!(which_result.is_ok(), from_path_result.is_some());
    }

    #[tokio::test]
    async fn missing_binary_is_external_tool_error() {
        let extractor = CliExtractor::new(PathBuf::from("/nonexistent/yt-dlp-xyz"));
        let result = extractor.list_formats("https://example.com/v").await;
        assert!(matches!(result, Err(crate::Error::ExternalTool(_))));
    }
}
