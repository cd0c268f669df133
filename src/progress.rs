//! Parser for yt-dlp progress lines
//!
//! yt-dlp run with `--newline` prints one progress line per update:
//!
//! ```text
//! [download]  45.2% of   10.00MiB at    1.20MiB/s ETA 00:05
//! [download]  12.0% of ~  50.31MiB at  Unknown B/s ETA Unknown (frag 3/25)
//! [download] 100% of   10.00MiB in 00:00:03 at 3.05MiB/s
//! ```
//!
//! Everything else (`[youtube] ...: Downloading webpage`, merger and
//! post-processor messages) is informational and yields `None`.

use crate::types::Progress;
use regex::Regex;
use std::sync::LazyLock;

// The pattern is a literal, so compilation cannot fail at runtime.
#[allow(clippy::expect_used)]
static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*(?:\[download\]\s+)?
        (?P<percent>\d+(?:\.\d+)?)%
        (?:\s+of\s+~?\s*(?P<total>\S+))?
        (?:\s+in\s+\S+)?
        (?:\s+at\s+(?P<rate>Unknown\s+(?:B/s|speed)|\S+))?
        (?:\s+ETA\s+(?P<eta>\S+))?
        (?:\s+\(frag\s+[^)]*\))?
        \s*$",
    )
    .expect("progress pattern is valid")
});

/// Parse one line of extractor output
///
/// Returns `None` for lines that are not progress updates. The percentage is
/// clamped to `0.0..=100.0`; rate, ETA and total size reported as unknown
/// (or absent) are `None`.
pub fn parse(line: &str) -> Option<Progress> {
    let caps = PROGRESS_LINE.captures(line)?;

    let percent: f64 = caps.name("percent")?.as_str().parse().ok()?;
    let percent = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        return None;
    };

    Some(Progress {
        percent,
        rate: known(caps.name("rate").map(|m| m.as_str())),
        eta: known(caps.name("eta").map(|m| m.as_str())),
        total_size: known(caps.name("total").map(|m| m.as_str())),
    })
}

fn known(token: Option<&str>) -> Option<String> {
    let token = token?.trim();
    if token.is_empty() || token.eq_ignore_ascii_case("NA") || token.starts_with("Unknown") {
        None
    } else {
        Some(token.to_string())
    }
}
