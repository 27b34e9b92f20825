//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use downtrack_core::DEFAULT_MAX_ATTEMPTS;

/// File name used when the URL path carries none.
const DEFAULT_FILE_NAME: &str = "download.bin";

/// Track one download from submission to completion.
///
/// Downtrack submits a single URL to the HTTP transfer backend, follows the
/// job through its lifecycle (pending, running, paused, failed, successful)
/// and renders every observed event until the backend reports completion.
#[derive(Parser, Debug)]
#[command(name = "downtrack")]
#[command(author, version, about)]
pub struct Args {
    /// URL to download
    pub url: String,

    /// Destination file path (defaults to the URL file name in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Job title recorded with the request and used in announcements
    #[arg(long)]
    pub title: Option<String>,

    /// Free-form job description recorded with the request
    #[arg(long)]
    pub description: Option<String>,

    /// Announce the job in the log once the backend accepts it
    #[arg(long)]
    pub notify: bool,

    /// Maximum transfer attempts for transient failures (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: u8,

    /// Print tracker events as JSON lines on stdout instead of a progress bar
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Derives the destination used when `--output` is omitted: the last
/// non-empty path segment of the URL, in the current directory.
pub(crate) fn default_destination(url: &Url) -> PathBuf {
    let name = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME);
    PathBuf::from(name)
}
