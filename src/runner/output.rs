//! Subprocess output handling: line pumps, stderr tail, artifact lookup

use crate::utils::is_partial_file;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;

/// Longest line forwarded in one piece; longer runs are split at this size
pub(crate) const MAX_LINE_BYTES: u64 = 64 * 1024;

/// Which stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

/// One line of subprocess output
#[derive(Debug, Clone)]
pub(crate) struct OutputLine {
    pub(crate) stream: Stream,
    pub(crate) text: String,
}

/// Forward every line of `reader` into `tx` until EOF or the receiver is gone
///
/// yt-dlp may print non-UTF-8 titles, so lines are decoded lossily rather
/// than ending the pump. Output without a newline is forwarded in chunks of
/// at most [`MAX_LINE_BYTES`].
pub(crate) fn spawn_line_pump<R>(
    reader: R,
    stream: Stream,
    tx: mpsc::Sender<OutputLine>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let mut line = (&mut reader).take(MAX_LINE_BYTES);
            match line.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(OutputLine { stream, text }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(?stream, error = %e, "output pipe read failed");
                    break;
                }
            }
        }
    })
}

/// Last `capacity` non-empty stderr lines
#[derive(Debug)]
pub(crate) struct StderrTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StderrTail {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, line: &str) {
        if self.capacity == 0 || line.trim().is_empty() {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    /// Lines joined with newlines, oldest first
    pub(crate) fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Find the artifact a finished job left in its directory
///
/// Picks the largest regular file that is not a partial or scratch file;
/// ties go to the lexicographically smallest name so the choice is stable.
pub(crate) async fn locate_artifact(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best: Option<(u64, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        if !metadata.is_file() || is_partial_file(&path) {
            continue;
        }

        let len = metadata.len();
        let better = match &best {
            None => true,
            Some((best_len, best_path)) => {
                len > *best_len || (len == *best_len && path < *best_path)
            }
        };
        if better {
            best = Some((len, path));
        }
    }

    Ok(best.map(|(_, path)| path))
}
