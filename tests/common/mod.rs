//! Common test utilities for media-dl integration tests
//!
//! Jobs run against a fake `yt-dlp` shell script, so these helpers are
//! unix-only.

#![allow(dead_code)]

use media_dl::{Config, JobId, JobInfo, MediaDownloader, Status};
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Stand-in for yt-dlp
///
/// - `-J` prints a probe document with two formats
/// - URLs containing `fail` print an error to stderr and exit 1
/// - URLs containing `slow` report progress and then sleep
/// - anything else reports progress and writes `out.mp4` next to the `-o` template
const FAKE_YTDLP: &str = r#"#!/bin/sh
out=""
url=""
probe=0
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -J) probe=1; shift ;;
    --) url="$2"; break ;;
    *) shift ;;
  esac
done

if [ "$probe" = 1 ]; then
  echo '{"id":"abc","title":"Fake","formats":[{"format_id":"140","ext":"m4a","resolution":"audio only","format_note":"medium"},{"format_id":"18","ext":"mp4","resolution":"640x360","format_note":"360p"}]}'
  exit 0
fi

case "$url" in
  *fail*)
    echo "ERROR: [generic] Unsupported URL: $url" >&2
    exit 1
    ;;
  *slow*)
    echo "[download]   1.0% of 10MiB at 1.0MiB/s ETA 00:10"
    sleep 30
    exit 0
    ;;
esac

dir=$(dirname "$out")
echo "[youtube] abc: Downloading webpage"
echo "[download]  45.2% of 10MiB at 1.2MiB/s ETA 00:05"
echo "[download] 100% of 10MiB in 00:00:02 at 5MiB/s"
printf 'fake media' > "$dir/out.mp4"
"#;

/// Write the fake extractor into `dir` and return its path
pub fn write_fake_ytdlp(dir: &Path) -> PathBuf {
    let path = dir.join("yt-dlp");
    std::fs::write(&path, FAKE_YTDLP).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Config pointing at the fake extractor, with everything under `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.tools.ytdlp_path = Some(write_fake_ytdlp(dir));
    config.jobs.output_dir = dir.join("downloads");
    config.jobs.min_free_space = 0;
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    config
}

/// Downloader backed by the fake extractor
pub async fn create_downloader() -> (Arc<MediaDownloader>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let downloader = MediaDownloader::new(test_config(dir.path())).await.unwrap();
    (Arc::new(downloader), dir)
}

/// Serve the router on an ephemeral port and return its address
pub async fn start_server(downloader: Arc<MediaDownloader>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = media_dl::api::create_router(downloader.clone(), downloader.get_config());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Poll until the job reaches `status` (10s limit)
pub async fn wait_for_status(downloader: &MediaDownloader, id: JobId, status: Status) -> JobInfo {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let info = downloader.job(id).unwrap();
            if info.status == status {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for job status")
}
