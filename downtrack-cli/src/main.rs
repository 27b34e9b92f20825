//! CLI entry point for the downtrack tool.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use downtrack_core::{
    ChannelListener, DownloadTracker, HttpBackend, RetryPolicy, TrackerEvent, TransferRequest,
};
use tracing::{debug, info};
use url::Url;

mod cli;
mod crash;
mod output;

use cli::Args;
use crash::CrashReporter;
use output::OutputMode;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so --json keeps stdout machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let _crash_guard = CrashReporter::new(std::env::temp_dir().join("downtrack-crash"))
        .with_info("name", env!("CARGO_PKG_NAME"))
        .with_info("version", env!("CARGO_PKG_VERSION"))
        .on_exiting(|path, _report| {
            eprintln!("crash report saved to {}", path.display());
        })
        .install()
        .context("installing crash reporter")?;

    let url = Url::parse(&args.url).with_context(|| format!("invalid URL: {}", args.url))?;
    let destination = args
        .output
        .unwrap_or_else(|| cli::default_destination(&url));

    info!(url = %url, destination = %destination.display(), "Downtrack starting");

    let policy = RetryPolicy::with_max_attempts(u32::from(args.max_retries));
    let backend = Arc::new(HttpBackend::new(policy).context("building HTTP backend")?);
    let tracker = DownloadTracker::new(backend);

    let (listener, mut events) = ChannelListener::channel();
    tracker.set_listener(Arc::new(listener));

    let mut request =
        TransferRequest::new(url.as_str(), &destination).with_notification_visible(args.notify);
    if let Some(title) = args.title {
        request = request.with_title(title);
    }
    if let Some(description) = args.description {
        request = request.with_description(description);
    }

    let job = tracker
        .submit(request)
        .await
        .context("submitting download")?;
    debug!(job = %job, "job accepted");

    let mut output = OutputMode::from_args(args.json);
    let mut outcome = None;

    while let Some(event) = events.recv().await {
        output.render(&event)?;
        match event {
            TrackerEvent::Successful { final_path } => outcome = Some(Ok(final_path)),
            TrackerEvent::Failed {
                reason_code,
                reason,
            } => outcome = Some(Err((reason_code, reason))),
            TrackerEvent::Completed => break,
            _ => {}
        }
    }

    match outcome {
        Some(Ok(final_path)) => {
            info!(path = %final_path.display(), "download complete");
            if !args.json {
                println!("Saved to {}", final_path.display());
            }
            Ok(())
        }
        Some(Err((reason_code, reason))) => bail!("download failed: {reason} ({reason_code})"),
        None => bail!("tracker stopped before reporting completion"),
    }
}
