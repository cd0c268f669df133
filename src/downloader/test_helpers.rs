//! Shared test helpers for creating MediaDownloader instances in tests.

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::extractor::{ExtractionRequest, Extractor, UnavailableExtractor};
use crate::types::FormatInfo;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::process::Command;

/// Extractor that runs a shell snippet instead of yt-dlp
///
/// The snippet receives the job directory as `$1` and the URL as `$2`.
pub(crate) struct ScriptExtractor {
    pub(crate) script: String,
    pub(crate) formats: Vec<FormatInfo>,
}

impl ScriptExtractor {
    pub(crate) fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            formats: vec![FormatInfo {
                format_id: "18".into(),
                ext: Some("mp4".into()),
                resolution: Some("640x360".into()),
                note: Some("360p".into()),
            }],
        }
    }
}

#[async_trait]
impl Extractor for ScriptExtractor {
    fn download_command(&self, request: &ExtractionRequest<'_>) -> crate::Result<Command> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.script)
            .arg("sh")
            .arg(request.output_dir)
            .arg(request.url);
        Ok(command)
    }

    async fn list_formats(&self, _url: &str) -> crate::Result<Vec<FormatInfo>> {
        Ok(self.formats.clone())
    }

    fn name(&self) -> &'static str {
        "script"
    }

    fn binary(&self) -> Option<PathBuf> {
        Some(PathBuf::from("sh"))
    }
}

/// Script that reports progress and writes `out.mp4`
pub(crate) const SUCCESS_SCRIPT: &str = r#"echo '[youtube] abc: Downloading webpage'
echo '[download]  45.2% of 10MiB at 1.2MiB/s ETA 00:05'
echo '[download] 100% of 10MiB in 00:00:02 at 5MiB/s'
printf 'media bytes' > "$1/out.mp4""#;

/// Script that runs until it is cancelled
pub(crate) const SLOW_SCRIPT: &str =
    "echo '[download]   1.0% of 10MiB at 1MiB/s ETA 00:10'; sleep 30";

/// Config rooted in a temp dir with the free-space check disabled
pub(crate) fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.jobs.output_dir = dir.path().join("downloads");
    config.jobs.min_free_space = 0;
    config.jobs.max_concurrent_jobs = 3;
    config.jobs.shutdown_timeout = std::time::Duration::from_secs(10);
    config
}

/// Helper to create a test MediaDownloader backed by a shell script.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(script: &str) -> (MediaDownloader, tempfile::TempDir) {
    create_test_downloader_with(script, |_| {}).await
}

/// Like [`create_test_downloader`], with a hook to adjust the config
pub(crate) async fn create_test_downloader_with(
    script: &str,
    adjust: impl FnOnce(&mut Config),
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(&temp_dir);
    adjust(&mut config);

    let downloader =
        MediaDownloader::with_extractor(config, Arc::new(ScriptExtractor::new(script)))
            .await
            .unwrap();
    (downloader, temp_dir)
}

/// Downloader with no extractor binary at all
pub(crate) async fn create_unavailable_downloader() -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(&temp_dir);
    let downloader = MediaDownloader::with_extractor(config, Arc::new(UnavailableExtractor))
        .await
        .unwrap();
    (downloader, temp_dir)
}

/// Poll until the job reaches `status` (10s limit)
pub(crate) async fn wait_for_status(
    downloader: &MediaDownloader,
    id: crate::types::JobId,
    status: crate::types::Status,
) -> crate::types::JobInfo {
    tokio::time::timeout(std::time::Duration::from_secs(10), async {
        loop {
            let info = downloader.job(id).unwrap();
            if info.status == status {
                return info;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for job status")
}
