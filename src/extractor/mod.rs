//! External media extractor
//!
//! The extraction binary is an opaque capability behind the [`Extractor`]
//! trait. Implementations build the download command for a job and probe the
//! formats a URL offers; they never interpret the media themselves.
//!
//! - [`CliExtractor`]: runs the `yt-dlp` binary
//! - [`UnavailableExtractor`]: stand-in when no binary is installed, so the
//!   service still starts and reports the problem per job
//!
//! ## Usage
//!
//! ```no_run
//! use media_dl::extractor::{CliExtractor, Extractor};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = CliExtractor::from_path().expect("yt-dlp not found in PATH");
//! for format in extractor.list_formats("https://example.com/watch?v=1").await? {
//!     println!("{} {:?}", format.format_id, format.resolution);
//! }
//! # Ok(())
//! # }
//! ```

mod cli;
mod traits;
mod unavailable;

pub use cli::CliExtractor;
pub use traits::{ExtractionRequest, Extractor};
pub use unavailable::UnavailableExtractor;
